//! Concrete classifiers in spec table order (OSC 9;4 lives in [`super::ansi`]
//! because it runs on raw bytes, not here).

use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Classifier, LimitType, ParsedEvent, Platform};

const MAX_RETRY_AFTER_MS: u64 = 24 * 60 * 60 * 1000;
const DEFAULT_RETRY_AFTER_MS: u64 = 60_000;
/// Bare numbers at or above this are treated as a Unix epoch (seconds)
/// rather than a delta — no real retry delay is ~31 years.
const EPOCH_THRESHOLD_SECS: u64 = 1_000_000_000;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Parse a retry delay out of the matched text: seconds, a Unix epoch, or a
/// phrase like "in 3 minutes". Falls back to the 60 s default. Always
/// clamped to `[0, 24h]`.
fn parse_retry_after_ms(text: &str) -> u64 {
    static SECONDS_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)(\d+)\s*(?:s|sec|secs|second|seconds)\b").unwrap());
    static MINUTES_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)(\d+)\s*(?:m|min|mins|minute|minutes)\b").unwrap());
    static BARE_HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)retry-after:?\s*(\d+)").unwrap());

    let ms = if let Some(caps) = SECONDS_RE.captures(text) {
        caps[1].parse::<u64>().ok().map(|s| s * 1000)
    } else if let Some(caps) = MINUTES_RE.captures(text) {
        caps[1].parse::<u64>().ok().map(|m| m * 60 * 1000)
    } else if let Some(caps) = BARE_HEADER_RE.captures(text) {
        caps[1].parse::<u64>().ok().map(|s| {
            if s >= EPOCH_THRESHOLD_SECS {
                s.saturating_sub(now_secs()) * 1000
            } else {
                s * 1000
            }
        })
    } else {
        None
    };

    ms.unwrap_or(DEFAULT_RETRY_AFTER_MS).min(MAX_RETRY_AFTER_MS)
}

pub struct RateLimitClassifier;

impl Classifier for RateLimitClassifier {
    fn classify(&self, line: &str) -> Option<ParsedEvent> {
        static PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
            vec![
                ("claude-http-429", Regex::new(r"(?i)anthropic.*429|claude.*429").unwrap()),
                ("claude-overloaded", Regex::new(r"(?i)claude.*overloaded|anthropic.*overloaded").unwrap()),
                ("openai-http-429", Regex::new(r"(?i)openai.*429|429.*openai").unwrap()),
                ("cursor-rate-limit", Regex::new(r"(?i)cursor.*rate.?limit").unwrap()),
                ("gemini-resource-exhausted", Regex::new(r"(?i)gemini.*resource.?exhausted|resource.?exhausted.*gemini").unwrap()),
                ("openai-tpm-limit", Regex::new(r"(?i)tokens?\s*per\s*min(ute)?\s*limit|TPM limit").unwrap()),
                ("openai-rpm-limit", Regex::new(r"(?i)requests?\s*per\s*min(ute)?\s*limit|RPM limit").unwrap()),
                ("openai-retry-after", Regex::new(r"(?i)openai.*retry.after").unwrap()),
                ("retry-after-header", Regex::new(r"(?i)retry-after:?\s*\d+").unwrap()),
                ("http-429-generic", Regex::new(r"(?i)rate.?limit(ed)?|\b429\b|too many requests").unwrap()),
            ]
        });

        for (name, re) in PATTERNS.iter() {
            if let Some(m) = re.find(line) {
                return Some(ParsedEvent::RateLimit {
                    pattern_name: name,
                    matched_text: m.as_str().to_string(),
                    retry_after_ms: parse_retry_after_ms(line),
                });
            }
        }
        None
    }
}

pub struct StatusLineClassifier;

impl Classifier for StatusLineClassifier {
    fn classify(&self, line: &str) -> Option<ParsedEvent> {
        // Tolerant spacing: "TaskName ... 12s ... 340 tokens"
        static STATUS_RE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)^\s*([A-Za-z][\w -]{1,40}?)\s*[·•\-]?\s*(?:\(?(\d+[smh](?:\s*\d+[smh])?)\)?)?.*?(\d[\d,]*\s*tokens?)?\s*$").unwrap()
        });
        // Require at least elapsed time or token info to avoid over-matching
        // arbitrary text as a status line.
        let caps = STATUS_RE.captures(line)?;
        let time_info = caps.get(2).map(|m| m.as_str().to_string());
        let token_info = caps.get(3).map(|m| m.as_str().to_string());
        if time_info.is_none() && token_info.is_none() {
            return None;
        }
        Some(ParsedEvent::StatusLine {
            task_name: caps[1].trim().to_string(),
            full_line: line.to_string(),
            time_info,
            token_info,
        })
    }
}

pub struct QuestionClassifier;

impl Classifier for QuestionClassifier {
    fn classify(&self, line: &str) -> Option<ParsedEvent> {
        static CURSOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[❯›>]\s*\d+[.)]").unwrap());
        static FOOTER_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"(?i)enter to select.*navigate.*esc to cancel").unwrap());
        static REJECT_RE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)^\s*[$#%>]\s|https?://|`|\.(rs|ts|js|py|go|json|toml)\b").unwrap()
        });

        if CURSOR_RE.is_match(line) || FOOTER_RE.is_match(line) {
            return Some(ParsedEvent::Question {
                prompt_text: line.trim().to_string(),
            });
        }

        let trimmed = line.trim_end();
        if trimmed.ends_with('?') && !REJECT_RE.is_match(trimmed) {
            return Some(ParsedEvent::Question {
                prompt_text: trimmed.to_string(),
            });
        }
        None
    }
}

pub struct UsageLimitClassifier;

impl Classifier for UsageLimitClassifier {
    fn classify(&self, line: &str) -> Option<ParsedEvent> {
        static USAGE_RE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)(\d{1,3})%.*?\b(weekly|session)\b|\b(weekly|session)\b.*?(\d{1,3})%").unwrap()
        });
        let caps = USAGE_RE.captures(line)?;
        let (pct_str, kind_str) = if caps.get(1).is_some() {
            (caps.get(1)?.as_str(), caps.get(2)?.as_str())
        } else {
            (caps.get(4)?.as_str(), caps.get(3)?.as_str())
        };
        let percentage: u32 = pct_str.parse().ok()?;
        #[allow(clippy::cast_possible_truncation)]
        let percentage = percentage.min(100) as u8;
        let limit_type = if kind_str.eq_ignore_ascii_case("weekly") {
            LimitType::Weekly
        } else {
            LimitType::Session
        };
        Some(ParsedEvent::UsageLimit {
            percentage,
            limit_type,
        })
    }
}

pub struct PlanFileClassifier;

impl Classifier for PlanFileClassifier {
    fn classify(&self, line: &str) -> Option<ParsedEvent> {
        static PLAN_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"(?:^|[\s'\x22(])((?:\.claude/)?plans/[\w./-]+\.md)\b").unwrap());
        let caps = PLAN_RE.captures(line)?;
        Some(ParsedEvent::PlanFile {
            path: caps[1].to_string(),
        })
    }
}

pub struct PrUrlClassifier;

impl Classifier for PrUrlClassifier {
    fn classify(&self, line: &str) -> Option<ParsedEvent> {
        static GITHUB_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"https://github\.com/[\w.-]+/[\w.-]+/pull/(\d+)").unwrap());
        static GITLAB_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"https://gitlab\.com/[\w./-]+/-/merge_requests/(\d+)").unwrap());

        if let Some(caps) = GITHUB_RE.captures(line) {
            return Some(ParsedEvent::PrUrl {
                number: caps[1].parse().ok()?,
                url: caps[0].to_string(),
                platform: Platform::Github,
            });
        }
        if let Some(caps) = GITLAB_RE.captures(line) {
            return Some(ParsedEvent::PrUrl {
                number: caps[1].parse().ok()?,
                url: caps[0].to_string(),
                platform: Platform::Gitlab,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_extracts_seconds() {
        let event = RateLimitClassifier
            .classify("Rate limited. Please retry after 42 seconds")
            .expect("should match");
        match event {
            ParsedEvent::RateLimit { retry_after_ms, .. } => assert_eq!(retry_after_ms, 42_000),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn question_detects_ink_style_menu() {
        let event = QuestionClassifier
            .classify("  › 1. Continue   2. Cancel  ")
            .expect("should match");
        assert!(matches!(event, ParsedEvent::Question { .. }));
    }

    #[test]
    fn question_rejects_shell_prompt_ending_in_question_mark() {
        assert!(QuestionClassifier.classify("$ ls nonexistent?").is_none());
    }

    #[test]
    fn usage_limit_extracts_percentage_and_kind() {
        let event = UsageLimitClassifier
            .classify("You've used 87% of your weekly limit")
            .expect("should match");
        match event {
            ParsedEvent::UsageLimit { percentage, limit_type } => {
                assert_eq!(percentage, 87);
                assert_eq!(limit_type, LimitType::Weekly);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn plan_file_matches_claude_plans_dir() {
        let event = PlanFileClassifier
            .classify("Wrote plan to .claude/plans/2026-01-01-feature.md")
            .expect("should match");
        match event {
            ParsedEvent::PlanFile { path } => assert_eq!(path, ".claude/plans/2026-01-01-feature.md"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn pr_url_extracts_github_number() {
        let event = PrUrlClassifier
            .classify("Opened https://github.com/acme/widgets/pull/42 for review")
            .expect("should match");
        match event {
            ParsedEvent::PrUrl { number, platform, .. } => {
                assert_eq!(number, 42);
                assert_eq!(platform, Platform::Github);
            }
            _ => panic!("wrong variant"),
        }
    }
}
