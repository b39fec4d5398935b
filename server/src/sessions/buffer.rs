//! Byte-oriented ring buffer with `tokio::sync::Notify` for subscriber wakeup.
//!
//! [`OutputLog`] stores the raw bytes a session's reader emits, each chunk
//! tagged with a monotonically increasing sequence number. It never touches
//! UTF-8 boundaries — decoding happens downstream in [`super::framing`]. When
//! the buffer exceeds its byte budget, the oldest chunks are evicted and a
//! running "lost bytes" counter is bumped, surfaced to catch-up callers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Notify;

/// A single sequenced chunk of raw output bytes.
#[derive(Debug, Clone)]
pub struct OutputChunk {
    /// Monotonically increasing sequence number, unique within a session.
    pub seq: u64,
    pub bytes: Vec<u8>,
    /// Unix timestamp in milliseconds when the chunk was produced.
    pub timestamp_ms: u64,
}

/// Ring buffer of [`OutputChunk`]s bounded by total byte size.
pub struct OutputLog {
    chunks: VecDeque<OutputChunk>,
    total_bytes: usize,
    max_bytes: usize,
    next_seq: u64,
    notify: Arc<Notify>,
    /// Bytes evicted since the buffer was created (monotonic).
    lost_bytes: u64,
}

impl OutputLog {
    /// Create a buffer that holds at most `max_bytes` of raw output.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            total_bytes: 0,
            max_bytes,
            next_seq: 1,
            notify: Arc::new(Notify::new()),
            lost_bytes: 0,
        }
    }

    /// Append a chunk, evicting the oldest chunks until back under budget.
    /// Returns the assigned sequence number.
    pub fn push(&mut self, bytes: Vec<u8>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        #[allow(clippy::cast_possible_truncation)]
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64);

        self.total_bytes += bytes.len();
        self.chunks.push_back(OutputChunk {
            seq,
            bytes,
            timestamp_ms,
        });

        while self.total_bytes > self.max_bytes {
            if let Some(evicted) = self.chunks.pop_front() {
                self.total_bytes -= evicted.bytes.len();
                self.lost_bytes += evicted.bytes.len() as u64;
            } else {
                break;
            }
        }

        self.notify.notify_waiters();
        seq
    }

    /// Return all chunks with `seq > since`, plus the number of bytes dropped
    /// between `since` and the oldest chunk still retained.
    pub fn read_since(&self, since: u64) -> (Vec<OutputChunk>, u64) {
        let oldest_available = self.chunks.front().map_or(self.next_seq, |c| c.seq);
        let dropped = if oldest_available > since.saturating_add(1) {
            self.lost_bytes
        } else {
            0
        };
        let chunks = self
            .chunks
            .iter()
            .filter(|c| c.seq > since)
            .cloned()
            .collect();
        (chunks, dropped)
    }

    /// Concatenate the last `n` bytes currently retained (for `snapshot`).
    pub fn tail_bytes(&self, n: usize) -> Vec<u8> {
        let mut buf: Vec<u8> = self.chunks.iter().flat_map(|c| c.bytes.iter().copied()).collect();
        if buf.len() > n {
            let start = buf.len() - n;
            buf.drain(..start);
        }
        buf
    }

    pub fn has_entries_since(&self, since: u64) -> bool {
        self.chunks.back().is_some_and(|c| c.seq > since)
    }

    pub fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn lost_bytes(&self) -> u64 {
        self.lost_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_assigns_increasing_seq() {
        let mut log = OutputLog::new(1024);
        let a = log.push(b"hello".to_vec());
        let b = log.push(b"world".to_vec());
        assert!(b > a);
    }

    #[test]
    fn eviction_tracks_lost_bytes() {
        let mut log = OutputLog::new(8);
        log.push(vec![0u8; 5]);
        log.push(vec![0u8; 5]);
        assert!(log.lost_bytes() > 0);
        assert!(log.total_bytes <= 8);
    }

    #[test]
    fn read_since_filters_correctly() {
        let mut log = OutputLog::new(1024);
        let a = log.push(b"one".to_vec());
        let b = log.push(b"two".to_vec());
        let (chunks, dropped) = log.read_since(a);
        assert_eq!(dropped, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].seq, b);
    }

    #[test]
    fn tail_bytes_returns_suffix() {
        let mut log = OutputLog::new(1024);
        log.push(b"hello ".to_vec());
        log.push(b"world".to_vec());
        assert_eq!(log.tail_bytes(5), b"world");
    }
}
