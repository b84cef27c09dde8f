//! Backoff calculation
//!
//! Exponential per-target delay (`1h * 2^level`, capped at 24h) combined with
//! an optional server retry hint. The later of the two candidate times wins,
//! so a permissive hint never shortens a failure streak's schedule.

use chrono::{DateTime, TimeDelta, Utc};

/// Delay at backoff level 0
pub const BASE_BACKOFF_HOURS: i64 = 1;

/// Upper bound on the exponential delay
pub const MAX_BACKOFF_HOURS: i64 = 24;

/// Backoff level stops growing here
pub const MAX_BACKOFF_LEVEL: u32 = 5;

/// Global cooldown applied when a throttle carries no retry hint
pub const DEFAULT_GLOBAL_COOLDOWN_SECS: u64 = 60 * 60;

/// Exponential delay for a backoff level, clamped to [`MAX_BACKOFF_HOURS`]
pub fn backoff_delay(level: u32) -> TimeDelta {
    let factor = 2i64.checked_pow(level).unwrap_or(i64::MAX);
    let hours = BASE_BACKOFF_HOURS.saturating_mul(factor).min(MAX_BACKOFF_HOURS);
    TimeDelta::hours(hours)
}

/// Absolute time `secs` seconds after `now`, if representable
fn after_secs(now: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
}

/// Next permissible retry for a target at `level`, measured from `now`
pub fn next_retry_at(now: DateTime<Utc>, level: u32, server_hint_secs: Option<u64>) -> DateTime<Utc> {
    let exponential = now + backoff_delay(level);
    match server_hint_secs.and_then(|secs| after_secs(now, secs)) {
        Some(hinted) => exponential.max(hinted),
        None => exponential,
    }
}

/// Next permissible retry measured from the current time
pub fn next_retry(level: u32, server_hint_secs: Option<u64>) -> DateTime<Utc> {
    next_retry_at(Utc::now(), level, server_hint_secs)
}

/// End of a global cooldown: the server hint if present, else one hour
pub fn global_cooldown_until(now: DateTime<Utc>, server_hint_secs: Option<u64>) -> DateTime<Utc> {
    let secs = server_hint_secs.unwrap_or(DEFAULT_GLOBAL_COOLDOWN_SECS);
    after_secs(now, secs).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
