//! Output Parser: classifies cleaned session output lines into typed events.
//!
//! The parser is a fixed, ordered list of classifiers, each a pure function
//! over a line. The first to match wins; later classifiers never see a line
//! that already matched. OSC 9;4 progress is the one exception — it is
//! detected on raw, pre-ANSI-strip bytes because stripping erases the
//! sequence, and a match there short-circuits the rest of the table (the
//! resulting cleaned line, usually empty, never reaches other classifiers).

mod ansi;
mod classifiers;

pub use ansi::strip_ansi;

use serde::Serialize;

/// A typed classification of a single output line.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ParsedEvent {
    RateLimit {
        pattern_name: &'static str,
        matched_text: String,
        retry_after_ms: u64,
    },
    StatusLine {
        task_name: String,
        full_line: String,
        time_info: Option<String>,
        token_info: Option<String>,
    },
    Progress {
        state: ProgressState,
        value: u8,
    },
    Question {
        prompt_text: String,
    },
    UsageLimit {
        percentage: u8,
        limit_type: LimitType,
    },
    PlanFile {
        path: String,
    },
    PrUrl {
        number: u64,
        url: String,
        platform: Platform,
    },
}

pub use ansi::ProgressState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    Weekly,
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Github,
    Gitlab,
}

/// A single capability every classifier implements — deliberately not a
/// class hierarchy, just values implementing one method.
trait Classifier {
    fn classify(&self, line: &str) -> Option<ParsedEvent>;
}

/// Fixed classifier order, excluding OSC 9;4 which runs on raw bytes first.
fn ordered_classifiers() -> [&'static dyn Classifier; 6] {
    [
        &classifiers::RateLimitClassifier,
        &classifiers::StatusLineClassifier,
        &classifiers::QuestionClassifier,
        &classifiers::UsageLimitClassifier,
        &classifiers::PlanFileClassifier,
        &classifiers::PrUrlClassifier,
    ]
}

/// Classify one line of session output.
///
/// `cleaned` is the ANSI/SGR/OSC/CSI-stripped line passed to every
/// classifier but OSC 9;4; `raw` is the line before stripping, used only to
/// detect OSC 9;4 (which stripping would otherwise erase).
pub fn classify_line(cleaned: &str, raw: &str) -> Vec<ParsedEvent> {
    if let Some((state, value)) = ansi::find_osc_9_4(raw) {
        return vec![ParsedEvent::Progress { state, value }];
    }

    let truncated = if cleaned.len() > 65536 {
        &cleaned[..65536]
    } else {
        cleaned
    };

    for classifier in ordered_classifiers() {
        if let Some(event) = classifier.classify(truncated) {
            return vec![event];
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn osc_9_4_short_circuits_other_classifiers() {
        let raw = "\x1b]9;4;1;37\x07";
        let cleaned = strip_ansi(raw);
        let events = classify_line(&cleaned, raw);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ParsedEvent::Progress { value: 37, .. }));
    }

    #[test]
    fn plain_line_with_no_match_yields_nothing() {
        let events = classify_line("just some output", "just some output");
        assert!(events.is_empty());
    }

    #[test]
    fn long_line_is_truncated_but_does_not_panic() {
        let long = "a".repeat(100_000);
        let events = classify_line(&long, &long);
        assert!(events.is_empty());
    }
}
