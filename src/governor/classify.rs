//! Maps raw provider failures to a retry decision.
//!
//! Classification is substring matching against the provider's error text, so
//! all wording lives in [`PATTERNS`]. When the provider changes its messages,
//! that table is the one place to update.

use std::fmt::Display;

use serde::Serialize;

use crate::error::ProviderFailure;

/// Upper bound on error text that may reach a user-facing message
pub const SUMMARY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    RateLimited,
    QuotaExhausted,
    ServiceUnavailable,
    ContentBlocked,
    Transient,
    Unknown,
}

impl ProviderErrorKind {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ProviderErrorKind::RateLimited
                | ProviderErrorKind::QuotaExhausted
                | ProviderErrorKind::ServiceUnavailable
                | ProviderErrorKind::Transient
        )
    }
}

impl Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProviderErrorKind::RateLimited => "rate_limited",
            ProviderErrorKind::QuotaExhausted => "quota_exhausted",
            ProviderErrorKind::ServiceUnavailable => "service_unavailable",
            ProviderErrorKind::ContentBlocked => "content_blocked",
            ProviderErrorKind::Transient => "transient",
            ProviderErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Lower-case substrings checked in order; the first match wins.
///
/// Content-policy markers come first so a blocked response that also mentions
/// a status code is never retried. Quota precedes the bare `429` so
/// "429 quota exceeded" reports as quota.
pub const PATTERNS: &[(&str, ProviderErrorKind)] = &[
    ("prohibited_content", ProviderErrorKind::ContentBlocked),
    ("blocklist", ProviderErrorKind::ContentBlocked),
    ("safety", ProviderErrorKind::ContentBlocked),
    ("response blocked", ProviderErrorKind::ContentBlocked),
    ("prompt blocked", ProviderErrorKind::ContentBlocked),
    ("blockreason", ProviderErrorKind::ContentBlocked),
    ("block_reason", ProviderErrorKind::ContentBlocked),
    ("resource_exhausted", ProviderErrorKind::QuotaExhausted),
    ("resource exhausted", ProviderErrorKind::QuotaExhausted),
    ("quota", ProviderErrorKind::QuotaExhausted),
    ("429", ProviderErrorKind::RateLimited),
    ("rate limit", ProviderErrorKind::RateLimited),
    ("too many requests", ProviderErrorKind::RateLimited),
    ("503", ProviderErrorKind::ServiceUnavailable),
    ("unavailable", ProviderErrorKind::ServiceUnavailable),
    ("overloaded", ProviderErrorKind::ServiceUnavailable),
    ("timed out", ProviderErrorKind::Transient),
    ("timeout", ProviderErrorKind::Transient),
    ("connection", ProviderErrorKind::Transient),
    ("http 500", ProviderErrorKind::Transient),
    ("http 502", ProviderErrorKind::Transient),
    ("http 504", ProviderErrorKind::Transient),
];

/// Classifies one failed attempt
pub fn classify(failure: &ProviderFailure) -> ProviderErrorKind {
    match failure {
        ProviderFailure::EmptyPayload => ProviderErrorKind::ContentBlocked,
        ProviderFailure::Api(message) => classify_message(message),
    }
}

pub fn classify_message(message: &str) -> ProviderErrorKind {
    let lowered = message.to_lowercase();
    PATTERNS
        .iter()
        .find(|(pattern, _)| lowered.contains(pattern))
        .map(|(_, kind)| *kind)
        .unwrap_or(ProviderErrorKind::Unknown)
}

/// Shortens provider text to [`SUMMARY_LIMIT`] characters
pub fn summarize(failure: &ProviderFailure) -> String {
    let text = failure.to_string();
    let mut chars = text.chars();
    let summary: String = chars.by_ref().take(SUMMARY_LIMIT).collect();
    if chars.next().is_some() {
        format!("{}...", summary)
    } else {
        summary
    }
}
