//! Human and machine readable views of the scheduler state

use chrono::{DateTime, Local, TimeDelta, Utc};
use colored::Colorize;
use serde::Serialize;
use tracing::debug;

use crate::catalog::RefreshSummary;
use crate::controller::{CycleOutcome, ProbeReport};
use crate::domain::{OutcomeKind, Priority, RateLimitInfo, SchedulerState, TargetRecord};
use crate::scheduler;

/// Targets listed by `next` when nothing is eligible
const UPCOMING_LIMIT: usize = 5;

/// Per-tier outcome counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub priority: Priority,
    pub name: &'static str,
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    pub rate_limited: usize,
    pub auth_error: usize,
    pub untested: usize,
}

impl TierCounts {
    fn new(priority: Priority) -> Self {
        Self {
            priority,
            name: priority.name(),
            ..Default::default()
        }
    }

    fn count(&mut self, record: &TargetRecord) {
        self.total += 1;
        match record.last_outcome {
            Some(OutcomeKind::Success) => self.success += 1,
            Some(OutcomeKind::Failure) => self.failure += 1,
            Some(OutcomeKind::RateLimited) => self.rate_limited += 1,
            Some(OutcomeKind::AuthError) => self.auth_error += 1,
            None => self.untested += 1,
        }
    }
}

/// Snapshot rendered by `mp status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub total: usize,
    pub tested: usize,
    pub successful: usize,
    pub ready: usize,
    pub global_cooldown_until: Option<DateTime<Utc>>,
    pub cooldown_remaining_secs: Option<i64>,
    pub rate_limit: Option<RateLimitInfo>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub tiers: Vec<TierCounts>,
}

impl StatusReport {
    pub fn build(state: &SchedulerState, now: DateTime<Utc>) -> Self {
        debug!(targets = state.len(), "StatusReport::build: called");
        let mut tiers: Vec<TierCounts> = Priority::all().map(TierCounts::new).collect();
        for record in state.targets.values() {
            let index = usize::from(record.priority.value() - 1);
            if let Some(tier) = tiers.get_mut(index) {
                tier.count(record);
            }
        }

        let tested = state.targets.values().filter(|r| r.is_tested()).count();
        let successful = tiers.iter().map(|t| t.success).sum();

        Self {
            total: state.len(),
            tested,
            successful,
            ready: scheduler::eligible(state, now).len(),
            global_cooldown_until: state.global_cooldown_until,
            cooldown_remaining_secs: state.cooldown_remaining(now).map(|d| d.num_seconds()),
            rate_limit: state.rate_limit.clone(),
            last_cycle_at: state.last_cycle_at,
            last_refresh_at: state.last_refresh_at,
            tiers,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{}\n", "Model probe status".bold()));
        out.push_str("------------------\n");

        match self.cooldown_remaining_secs {
            Some(secs) => out.push_str(&format!(
                "Global cooldown: {} (until {})\n",
                format_remaining(TimeDelta::seconds(secs)).red(),
                format_time(self.global_cooldown_until)
            )),
            None => out.push_str(&format!("Global cooldown: {}\n", "none".green())),
        }

        if let Some(info) = &self.rate_limit {
            let remaining = info.remaining.map_or("-".to_string(), |r| r.to_string());
            let retry_after = info.retry_after.map_or("-".to_string(), |r| format!("{r}s"));
            out.push_str(&format!(
                "Rate limit: remaining {}, resets {}, retry-after {}\n",
                remaining,
                format_time(info.reset_time),
                retry_after
            ));
        }

        out.push('\n');
        out.push_str(&format!("Total:      {}\n", self.total));
        out.push_str(&format!("Tested:     {}\n", self.tested));
        out.push_str(&format!("Successful: {}\n", self.successful.to_string().green()));
        out.push_str(&format!("Ready now:  {}\n", self.ready));
        out.push('\n');

        out.push_str(&format!(
            "{:<18} {:>5} {:>7} {:>7} {:>7} {:>5} {:>8}\n",
            "Tier", "total", "success", "failure", "limited", "auth", "untested"
        ));
        for tier in self.tiers.iter().filter(|t| t.total > 0) {
            out.push_str(&format!(
                "{:<18} {:>5} {:>7} {:>7} {:>7} {:>5} {:>8}\n",
                format!("{} {}", tier.priority, tier.name),
                tier.total,
                tier.success,
                tier.failure,
                tier.rate_limited,
                tier.auth_error,
                tier.untested
            ));
        }

        out.push('\n');
        out.push_str(&format!("Last cycle:   {}\n", format_time(self.last_cycle_at)));
        out.push_str(&format!("Last refresh: {}\n", format_time(self.last_refresh_at)));
        out
    }
}

/// Preview of the next batch without probing
pub fn render_next(state: &SchedulerState, now: DateTime<Utc>, limit: usize) -> String {
    debug!(limit, "render_next: called");
    let mut out = String::new();

    if let Some(remaining) = state.cooldown_remaining(now) {
        out.push_str(&format!(
            "Global cooldown active for {}; nothing will be probed until {}\n",
            format_remaining(remaining).red(),
            format_time(state.global_cooldown_until)
        ));
        return out;
    }

    let batch = scheduler::select_batch(state, limit, now);
    if !batch.is_empty() {
        out.push_str(&format!("{}\n", format!("Next {} eligible:", batch.len()).bold()));
        for (i, record) in batch.iter().enumerate() {
            let last = match record.last_probe_at {
                Some(at) => format!("last {} ({})", format_time(Some(at)), outcome_label(record.last_outcome)),
                None => "untested".to_string(),
            };
            out.push_str(&format!(
                "{:>3}. [{}] {} {}\n",
                i + 1,
                record.priority,
                record.id,
                last.dimmed()
            ));
        }
        return out;
    }

    let upcoming = scheduler::upcoming(state, now, UPCOMING_LIMIT);
    if upcoming.is_empty() {
        out.push_str("No targets known. Run `mp refresh` first.\n");
        return out;
    }

    out.push_str("No targets eligible. Soonest to leave cooldown:\n");
    for record in upcoming {
        let wait = record
            .next_eligible_at
            .map(|at| format_remaining(at - now))
            .unwrap_or_default();
        out.push_str(&format!("  [{}] {} in {}\n", record.priority, record.id, wait.yellow()));
        if let Some(error) = &record.last_error {
            out.push_str(&format!("      {}\n", error.dimmed()));
        }
    }
    out
}

/// Summary of a finished polling cycle
pub fn render_cycle(outcome: &CycleOutcome, now: DateTime<Utc>) -> String {
    debug!("render_cycle: called");
    let mut out = String::new();
    for probe in outcome.probes() {
        out.push_str(&render_probe(probe));
    }

    match outcome {
        CycleOutcome::CoolingDown { until } => {
            out.push_str(&format!(
                "Global cooldown active, {} remaining (until {})\n",
                format_remaining(*until - now).red(),
                format_time(Some(*until))
            ));
        }
        CycleOutcome::NothingEligible => out.push_str("No targets eligible for probing.\n"),
        CycleOutcome::Completed { probes } => {
            let ok = probes.iter().filter(|p| p.outcome.is_success()).count();
            out.push_str(&format!("Batch complete: {}/{} succeeded\n", ok, probes.len()));
        }
        CycleOutcome::RateLimited {
            cooldown_until,
            skipped,
            ..
        } => {
            out.push_str(&format!(
                "{} cooling down until {}; {} target(s) left for a later cycle\n",
                "Rate limited:".red().bold(),
                format_time(Some(*cooldown_until)),
                skipped.len()
            ));
        }
    }
    out
}

fn render_probe(probe: &ProbeReport) -> String {
    let latency = format!("{}ms", probe.outcome.latency.as_millis());
    let status = match probe.outcome.kind {
        OutcomeKind::Success => "✓".green(),
        OutcomeKind::RateLimited => "⏸".yellow(),
        OutcomeKind::Failure | OutcomeKind::AuthError => "✗".red(),
    };
    let mut line = format!("{} [{}] {} {}", status, probe.priority, probe.id, latency.dimmed());
    if let Some(error) = &probe.outcome.error {
        line.push_str(&format!(" {}", error));
    }
    if let Some(next) = probe.next_eligible_at {
        line.push_str(&format!(" (level {}, retry {})", probe.backoff_level, format_time(Some(next))));
    }
    line.push('\n');
    line
}

/// Summary of a catalog refresh
pub fn render_refresh(summary: &RefreshSummary, state: &SchedulerState) -> String {
    debug!("render_refresh: called");
    let mut out = format!(
        "Catalog: {} models, {} new, {} re-prioritized\n",
        summary.total,
        summary.added.len().to_string().green(),
        summary.reprioritized.len()
    );

    let important: Vec<&TargetRecord> = summary
        .added
        .iter()
        .filter_map(|id| state.get(id))
        .filter(|r| !r.is_tested() && r.priority <= Priority::new(2))
        .collect();
    if !important.is_empty() {
        out.push_str("New high-priority targets:\n");
        for record in important {
            out.push_str(&format!("  [{}] {}\n", record.priority, record.id));
        }
    }
    out
}

fn outcome_label(kind: Option<OutcomeKind>) -> String {
    kind.map_or("untested".to_string(), |k| k.to_string())
}

/// Local wall-clock rendering of an optional timestamp
pub fn format_time(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "never".to_string(),
    }
}

/// Compact `1h 5m` style rendering of a positive span
pub fn format_remaining(delta: TimeDelta) -> String {
    let secs = delta.num_seconds().max(0);
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    match (hours, minutes) {
        (0, 0) => format!("{seconds}s"),
        (0, _) => format!("{minutes}m {seconds}s"),
        _ => format!("{hours}h {minutes}m"),
    }
}
