//! UTF-8-boundary-safe byte-to-line framing.
//!
//! A PTY read can split a multi-byte UTF-8 codepoint across two `read()`
//! calls. [`LineFramer`] never hands a consumer a partial codepoint: it
//! retains undecodable trailing bytes until a following chunk completes
//! them, and only then splits the result on line boundaries.
//!
//! `\r\n` is treated as a single line boundary, matching terminal
//! conventions, not `\n` followed by an empty line.

/// Accumulates raw bytes across reads and yields complete, valid UTF-8 lines.
#[derive(Default)]
pub struct LineFramer {
    /// Bytes carried over from the previous push: either an incomplete
    /// UTF-8 sequence, or a line fragment with no terminator yet.
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self { pending: Vec::new() }
    }

    /// Feed new raw bytes. Returns complete lines (terminator stripped) in
    /// order. Incomplete trailing data is retained for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let (text, consumed) = Self::decode_prefix(&self.pending);
        self.pending.drain(..consumed);

        let mut lines = Vec::new();
        let mut rest = text.as_str();
        loop {
            if let Some(idx) = rest.find('\n') {
                let mut line = &rest[..idx];
                if let Some(stripped) = line.strip_suffix('\r') {
                    line = stripped;
                }
                lines.push(line.to_string());
                rest = &rest[idx + 1..];
            } else {
                break;
            }
        }
        // Anything left over without a terminator goes back into pending as
        // bytes, so it's re-decoded (and possibly joined with more data) on
        // the next push.
        if !rest.is_empty() {
            let mut carry = rest.as_bytes().to_vec();
            carry.extend_from_slice(&self.pending);
            self.pending = carry;
        }
        lines
    }

    /// Force out whatever partial line remains, without a terminator. Used
    /// when a session closes or a consumer explicitly requests a flush.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Decode the longest valid-UTF-8 prefix of `buf`. Returns the decoded
    /// text and the number of bytes consumed from the front. The remainder
    /// (0-3 bytes) is an incomplete trailing codepoint left for the caller
    /// to retain.
    fn decode_prefix(buf: &[u8]) -> (String, usize) {
        match std::str::from_utf8(buf) {
            Ok(s) => (s.to_string(), buf.len()),
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                // error_len() == None means the tail is a valid prefix of some
                // codepoint, just truncated — keep it pending. Some(n) means
                // those bytes are genuinely invalid; decode up to the error
                // lossily once so the consumer isn't stuck forever.
                if e.error_len().is_some() {
                    let text = String::from_utf8_lossy(buf).into_owned();
                    (text, buf.len())
                } else {
                    let text = std::str::from_utf8(&buf[..valid_up_to])
                        .unwrap_or_default()
                        .to_string();
                    (text, valid_up_to)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_codepoint_across_pushes_decodes_cleanly() {
        let mut framer = LineFramer::new();
        let full = "café\n".as_bytes().to_vec();
        // Split in the middle of the 2-byte 'é' (0xC3 0xA9).
        let split_at = full.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let (a, b) = full.split_at(split_at);
        assert!(framer.push(a).is_empty());
        let lines = framer.push(b);
        assert_eq!(lines, vec!["café".to_string()]);
    }

    #[test]
    fn crlf_is_one_boundary() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"hello\r\nworld\r\n");
        assert_eq!(lines, vec!["hello".to_string(), "world".to_string()]);
    }

    #[test]
    fn partial_line_waits_for_terminator() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"no newline yet").is_empty());
        let lines = framer.push(b" now\n");
        assert_eq!(lines, vec!["no newline yet now".to_string()]);
    }

    #[test]
    fn flush_returns_trailing_fragment() {
        let mut framer = LineFramer::new();
        framer.push(b"dangling");
        assert_eq!(framer.flush(), Some("dangling".to_string()));
        assert_eq!(framer.flush(), None);
    }
}
