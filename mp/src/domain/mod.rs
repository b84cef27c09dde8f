//! Domain types for modelprobe
//!
//! The persisted aggregate ([`SchedulerState`]) and its per-target entries
//! ([`TargetRecord`]), plus the transient result of a single probe.
//!
//! All persisted types serialize with camelCase keys and epoch-millisecond
//! timestamps so state files written by earlier deployments load unchanged.

mod outcome;
mod priority;
mod record;
mod state;

pub use outcome::{OutcomeKind, ProbeOutcome, RateLimitInfo};
pub use priority::Priority;
pub use record::TargetRecord;
pub use state::SchedulerState;

/// Serde helpers for `Option<Duration>` stored as integer milliseconds
pub(crate) mod duration_ms_option {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms: Option<f64> = Option::deserialize(deserializer)?;
        Ok(ms.filter(|v| v.is_finite() && *v >= 0.0).map(|v| Duration::from_millis(v as u64)))
    }
}
