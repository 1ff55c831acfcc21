//! Rate-limit detection by provider message substrings
//!
//! The HTTP status `429` is matched as a standalone number only, so ids and
//! counts that happen to contain those digits are not throttling.

use crate::error::SinkError;
use once_cell::sync::Lazy;
use regex::Regex;

static TOO_MANY_REQUESTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b429\b").expect("valid status pattern"));

/// Substrings providers use to report throttling, lower-cased
pub const DEFAULT_RATE_LIMIT_PATTERNS: &[&str] = &[
    "rate limit",
    "too many requests",
    "exceeded the rate",
    "quota",
];

/// Case-insensitive matcher over a fixed set of substrings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDetector {
    patterns: Vec<String>,
}

impl Default for RateLimitDetector {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_RATE_LIMIT_PATTERNS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
        }
    }
}

impl RateLimitDetector {
    /// Built-in patterns plus `extra`
    #[must_use]
    pub fn with_patterns<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut detector = Self::default();
        for pattern in extra {
            let pattern = pattern.as_ref().trim().to_lowercase();
            if !pattern.is_empty() && !detector.patterns.contains(&pattern) {
                detector.patterns.push(pattern);
            }
        }
        detector
    }

    /// Active patterns
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether `message` reports throttling
    #[must_use]
    pub fn matches(&self, message: &str) -> bool {
        if TOO_MANY_REQUESTS.is_match(message) {
            return true;
        }
        let lowered = message.to_lowercase();
        self.patterns.iter().any(|p| lowered.contains(p.as_str()))
    }

    /// Whether `error` reports throttling
    #[must_use]
    pub fn is_rate_limit(&self, error: &SinkError) -> bool {
        matches!(error, SinkError::Provider { status: Some(429), .. })
            || self.matches(&error.detection_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_phrasings() {
        let detector = RateLimitDetector::default();
        assert!(detector.matches("HTTP 429"));
        assert!(detector.matches("Rate Limit reached for project"));
        assert!(detector.matches("Too Many Requests"));
        assert!(detector.matches("You have exceeded the rate of 10 queries"));
        assert!(detector.matches("daily QUOTA used up"));
        assert!(!detector.matches("connection reset by peer"));
    }

    #[test]
    fn status_digits_inside_other_numbers_do_not_match() {
        let detector = RateLimitDetector::default();
        assert!(!detector.matches("event 14291 not found"));
        assert!(!detector.matches("cohort size 4290 below threshold"));
        assert!(!detector.is_rate_limit(&SinkError::provider_status(500, "job 84293 failed")));
        assert!(detector.is_rate_limit(&SinkError::provider_status(429, "slow down")));
        assert!(detector.matches("status=429; retry later"));
    }

    #[test]
    fn extra_patterns_are_normalised() {
        let detector = RateLimitDetector::with_patterns(["  Throttled ", "quota"]);
        assert_eq!(detector.patterns().len(), DEFAULT_RATE_LIMIT_PATTERNS.len() + 1);
        assert!(detector.is_rate_limit(&SinkError::provider("request throttled")));
    }
}
