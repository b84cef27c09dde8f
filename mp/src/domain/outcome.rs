//! Probe outcome types

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Classified result of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failure,
    RateLimited,
    AuthError,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::AuthError => write!(f, "auth_error"),
        }
    }
}

/// Rate-limit telemetry reported by the upstream in response headers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    /// Remaining request quota
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,

    /// When the quota resets
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub reset_time: Option<DateTime<Utc>>,

    /// Server-supplied retry hint in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl RateLimitInfo {
    /// Extract telemetry from `x-ratelimit-*` and `retry-after` headers
    ///
    /// Returns `None` when none of the headers is present and parseable.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let number = |name: &str| -> Option<u64> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
        };

        let info = Self {
            remaining: number("x-ratelimit-remaining"),
            reset_time: number("x-ratelimit-reset")
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
            retry_after: number("retry-after"),
        };

        if info.is_empty() { None } else { Some(info) }
    }

    /// True when no field carries a value
    pub fn is_empty(&self) -> bool {
        self.remaining.is_none() && self.reset_time.is_none() && self.retry_after.is_none()
    }
}

/// Result of one probe attempt (not persisted)
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    /// Classified kind
    pub kind: OutcomeKind,

    /// Wall-clock time from request start to final parse
    pub latency: Duration,

    /// Error detail for non-success outcomes
    pub error: Option<String>,

    /// Telemetry from the final response's headers
    pub rate_limit: Option<RateLimitInfo>,

    /// Whether the parameter-shape retry was used
    pub retried: bool,
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }

    /// Server retry hint, if the final response carried one
    pub fn retry_after(&self) -> Option<u64> {
        self.rate_limit.as_ref().and_then(|r| r.retry_after)
    }
}
