//! Batch selection
//!
//! A target is eligible when neither the global cooldown nor its own cooldown
//! extends past `now`. Eligible targets are ordered by priority, then untested
//! before tested, then oldest probe first.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use tracing::debug;

use crate::domain::{SchedulerState, TargetRecord};

/// All eligible targets, in scheduling order
pub fn eligible(state: &SchedulerState, now: DateTime<Utc>) -> Vec<&TargetRecord> {
    if state.is_cooling_down(now) {
        debug!(until = ?state.global_cooldown_until, "eligible: global cooldown active");
        return Vec::new();
    }

    let mut ready: Vec<&TargetRecord> = state.targets.values().filter(|r| r.is_eligible_at(now)).collect();
    ready.sort_by(|a, b| schedule_order(a, b));
    ready
}

/// The next `batch_size` targets to probe
pub fn select_batch(state: &SchedulerState, batch_size: usize, now: DateTime<Utc>) -> Vec<&TargetRecord> {
    let mut batch = eligible(state, now);
    batch.truncate(batch_size);
    debug!(batch_size, selected = batch.len(), "select_batch: done");
    batch
}

/// Targets still in their own cooldown, soonest to become eligible first
pub fn upcoming(state: &SchedulerState, now: DateTime<Utc>, limit: usize) -> Vec<&TargetRecord> {
    let mut waiting: Vec<&TargetRecord> = state
        .targets
        .values()
        .filter(|r| r.next_eligible_at.is_some_and(|at| at > now))
        .collect();
    waiting.sort_by(|a, b| a.next_eligible_at.cmp(&b.next_eligible_at).then_with(|| a.id.cmp(&b.id)));
    waiting.truncate(limit);
    waiting
}

fn schedule_order(a: &TargetRecord, b: &TargetRecord) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| match (a.last_probe_at, b.last_probe_at) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(&y),
        })
}
