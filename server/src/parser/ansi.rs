//! ANSI/SGR/OSC/CSI stripping, and the OSC 9;4 progress pre-strip path.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches CSI sequences (`ESC [ ... <final byte>`), OSC sequences
/// (`ESC ] ... BEL` or `ESC ] ... ESC \`), and lone two-byte escapes.
static ANSI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?x)
        \x1b\[[0-9;?]*[ -/]*[@-~]   # CSI ... final byte
        |\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)  # OSC ... BEL or ST
        |\x1b[@-Z\\-_]              # two-byte escapes
    ")
    .expect("static ANSI regex must compile")
});

/// OSC 9;4 progress sequence: `ESC ] 9 ; 4 ; <state> ; <value> BEL`.
static OSC_9_4_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\]9;4;(\d);(\d+)(?:\x07|\x1b\\)").expect("static OSC 9;4 regex must compile")
});

/// Strip ANSI/SGR/OSC/CSI escape sequences from a line.
pub fn strip_ansi(line: &str) -> String {
    ANSI_RE.replace_all(line, "").into_owned()
}

/// Progress state encoded in an OSC 9;4 sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ProgressState {
    Remove,
    Normal,
    Error,
    Indeterminate,
}

/// Detect an OSC 9;4 progress report on raw (pre-strip) bytes. Must run
/// before ANSI stripping because stripping would erase the sequence.
pub fn find_osc_9_4(raw: &str) -> Option<(ProgressState, u8)> {
    let caps = OSC_9_4_RE.captures(raw)?;
    let state = match caps.get(1)?.as_str() {
        "0" => ProgressState::Remove,
        "1" => ProgressState::Normal,
        "2" => ProgressState::Error,
        "3" => ProgressState::Indeterminate,
        _ => return None,
    };
    let value: u32 = caps.get(2)?.as_str().parse().ok()?;
    #[allow(clippy::cast_possible_truncation)]
    let clamped = value.min(100) as u8;
    Some((state, clamped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_csi_color_codes() {
        let input = "\x1b[31mred text\x1b[0m";
        assert_eq!(strip_ansi(input), "red text");
    }

    #[test]
    fn osc_9_4_detected_before_stripping() {
        let raw = "\x1b]9;4;1;37\x07";
        let (state, value) = find_osc_9_4(raw).expect("should match");
        assert_eq!(state, ProgressState::Normal);
        assert_eq!(value, 37);
    }

    #[test]
    fn osc_9_4_absent_returns_none() {
        assert!(find_osc_9_4("plain line").is_none());
    }
}
