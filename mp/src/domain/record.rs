//! Per-target probe history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::debug;

use super::outcome::{OutcomeKind, ProbeOutcome};
use super::priority::Priority;
use crate::backoff;

/// Probe history for one target, keyed by its identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    /// Stable target identifier
    #[serde(rename = "modelId")]
    pub id: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(
        rename = "lastTestTime",
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub last_probe_at: Option<DateTime<Utc>>,

    #[serde(rename = "testResult", default, skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<OutcomeKind>,

    /// Absent when the target is not in cooldown
    #[serde(
        rename = "nextRetryTime",
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub next_eligible_at: Option<DateTime<Utc>>,

    /// Consecutive non-success outcomes, capped at [`backoff::MAX_BACKOFF_LEVEL`]
    #[serde(default, deserialize_with = "clamped_backoff_level")]
    pub backoff_level: u32,

    #[serde(rename = "errorMessage", default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(
        rename = "responseTime",
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::domain::duration_ms_option"
    )]
    pub latency: Option<Duration>,
}

/// Hand-edited files may carry negative, fractional or huge levels
fn clamped_backoff_level<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    let max = f64::from(backoff::MAX_BACKOFF_LEVEL);
    Ok(if raw.is_finite() { raw.round().clamp(0.0, max) as u32 } else { backoff::MAX_BACKOFF_LEVEL })
}

impl TargetRecord {
    /// Create an untested record
    pub fn new(id: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: id.into(),
            priority,
            last_probe_at: None,
            last_outcome: None,
            next_eligible_at: None,
            backoff_level: 0,
            last_error: None,
            latency: None,
        }
    }

    /// True once the target has been probed at least once
    pub fn is_tested(&self) -> bool {
        self.last_probe_at.is_some()
    }

    /// True unless the target's own cooldown extends past `now`
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.next_eligible_at.is_none_or(|until| until <= now)
    }

    /// Fold a probe outcome into the record
    ///
    /// Success clears the cooldown and backoff level. Failure and auth errors
    /// raise the backoff level and schedule the next eligible time. A
    /// rate-limited outcome keeps the backoff level and holds the target until
    /// the global cooldown the same signal triggers.
    pub fn apply(&mut self, outcome: &ProbeOutcome, now: DateTime<Utc>) {
        debug!(model = %self.id, kind = %outcome.kind, "TargetRecord::apply: called");
        self.last_probe_at = Some(now);
        self.latency = Some(outcome.latency);
        self.last_outcome = Some(outcome.kind);

        match outcome.kind {
            OutcomeKind::Success => {
                self.backoff_level = 0;
                self.next_eligible_at = None;
                self.last_error = None;
            }
            OutcomeKind::Failure | OutcomeKind::AuthError => {
                self.backoff_level = self.backoff_level.saturating_add(1).min(backoff::MAX_BACKOFF_LEVEL);
                self.next_eligible_at = Some(backoff::next_retry_at(now, self.backoff_level, outcome.retry_after()));
                self.last_error = outcome.error.clone();
                debug!(
                    model = %self.id,
                    backoff_level = self.backoff_level,
                    next_eligible_at = ?self.next_eligible_at,
                    "TargetRecord::apply: backing off"
                );
            }
            OutcomeKind::RateLimited => {
                self.next_eligible_at = Some(backoff::global_cooldown_until(now, outcome.retry_after()));
                self.last_error = outcome.error.clone();
            }
        }
    }
}
