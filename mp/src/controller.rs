//! Run controller
//!
//! Drives one polling cycle through Idle -> Selecting -> Probing -> Updating
//! -> Done. Probes run strictly one after another, and state is persisted
//! after every target so a crash mid-batch keeps the progress made so far.
//! A single rate-limit signal puts the whole upstream into a global cooldown
//! and ends the batch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backoff;
use crate::catalog::{CatalogError, CatalogSource, RefreshSummary, merge_catalog};
use crate::credential::{CredentialError, CredentialSource};
use crate::domain::{OutcomeKind, Priority, ProbeOutcome};
use crate::probe::Prober;
use crate::scheduler::{self, PriorityTable};
use crate::store::{StateStore, StoreError};

/// Fatal errors that end an invocation
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Catalog refresh failed: {0}")]
    Catalog(#[from] CatalogError),
}

/// One probed target and what was recorded for it
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub id: String,
    pub priority: Priority,
    pub outcome: ProbeOutcome,
    pub backoff_level: u32,
    pub next_eligible_at: Option<DateTime<Utc>>,
}

/// How a cycle ended
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// Global cooldown still active; nothing was probed
    CoolingDown { until: DateTime<Utc> },

    /// No target is currently eligible
    NothingEligible,

    /// Every selected target was probed
    Completed { probes: Vec<ProbeReport> },

    /// A rate-limit signal ended the batch early
    RateLimited {
        probes: Vec<ProbeReport>,
        cooldown_until: DateTime<Utc>,
        skipped: Vec<String>,
    },
}

impl CycleOutcome {
    /// Probes performed during the cycle
    pub fn probes(&self) -> &[ProbeReport] {
        match self {
            Self::Completed { probes } | Self::RateLimited { probes, .. } => probes,
            Self::CoolingDown { .. } | Self::NothingEligible => &[],
        }
    }
}

/// Orchestrates polling cycles and catalog refreshes
pub struct RunController {
    store: StateStore,
    prober: Prober,
    credential: Arc<dyn CredentialSource>,
    delay: Duration,
}

impl RunController {
    pub fn new(store: StateStore, prober: Prober, credential: Arc<dyn CredentialSource>) -> Self {
        debug!(path = %store.path().display(), "RunController::new: called");
        Self {
            store,
            prober,
            credential,
            delay: Duration::from_secs(1),
        }
    }

    /// Pause inserted between sequential probes
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Run one polling cycle over at most `batch_size` targets
    pub async fn run_cycle(&self, batch_size: usize) -> Result<CycleOutcome, ControllerError> {
        debug!(batch_size, "RunController::run_cycle: called");
        let mut state = self.store.load()?;

        let now = Utc::now();
        if let Some(until) = state.global_cooldown_until.filter(|_| state.is_cooling_down(now)) {
            info!(%until, "Global cooldown active, skipping cycle");
            return Ok(CycleOutcome::CoolingDown { until });
        }

        debug!("RunController::run_cycle: selecting");
        let batch: Vec<String> = scheduler::select_batch(&state, batch_size, now)
            .into_iter()
            .map(|r| r.id.clone())
            .collect();
        if batch.is_empty() {
            info!("No targets eligible");
            return Ok(CycleOutcome::NothingEligible);
        }

        let token = self.credential.token().await?;
        info!(count = batch.len(), "Probing batch");

        let total = batch.len();
        let mut probes = Vec::with_capacity(total);
        let mut throttled: Option<(DateTime<Utc>, Vec<String>)> = None;

        for (i, id) in batch.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            debug!(model = %id, index = i + 1, total, "RunController::run_cycle: probing");
            let outcome = self.prober.probe(id, &token).await;
            let probed_at = Utc::now();

            debug!(model = %id, kind = %outcome.kind, "RunController::run_cycle: updating");
            let Some(record) = state.get_mut(id) else {
                warn!(model = %id, "Selected target vanished from state");
                continue;
            };
            record.apply(&outcome, probed_at);
            let report = ProbeReport {
                id: id.clone(),
                priority: record.priority,
                backoff_level: record.backoff_level,
                next_eligible_at: record.next_eligible_at,
                outcome,
            };

            if let Some(info) = report.outcome.rate_limit.clone() {
                state.rate_limit = Some(info);
            }

            if report.outcome.kind == OutcomeKind::RateLimited {
                let until = backoff::global_cooldown_until(probed_at, report.outcome.retry_after());
                warn!(model = %id, %until, "Rate limited, global cooldown set");
                state.global_cooldown_until = Some(until);
                throttled = Some((until, batch[i + 1..].to_vec()));
            } else {
                info!(model = %id, kind = %report.outcome.kind, latency_ms = report.outcome.latency.as_millis(), "Probed");
            }

            self.store.save(&state)?;
            probes.push(report);

            if throttled.is_some() {
                break;
            }
        }

        debug!("RunController::run_cycle: done");
        state.last_cycle_at = Some(Utc::now());
        self.store.save(&state)?;

        Ok(match throttled {
            Some((cooldown_until, skipped)) => CycleOutcome::RateLimited {
                probes,
                cooldown_until,
                skipped,
            },
            None => CycleOutcome::Completed { probes },
        })
    }

    /// Fetch the catalog and merge it into the persisted state
    pub async fn refresh(
        &self,
        catalog: &dyn CatalogSource,
        table: &PriorityTable,
    ) -> Result<RefreshSummary, ControllerError> {
        debug!("RunController::refresh: called");
        let mut state = self.store.load()?;
        let token = self.credential.token().await?;
        let entries = catalog.list(&token).await?;

        let summary = merge_catalog(&mut state, &entries, table, Utc::now());
        self.store.save(&state)?;

        info!(
            total = summary.total,
            added = summary.added.len(),
            reprioritized = summary.reprioritized.len(),
            "Catalog refreshed"
        );
        Ok(summary)
    }
}
