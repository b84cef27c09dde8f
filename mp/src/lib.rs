//! ModelProbe - rate-limited probing scheduler for remote inference endpoints
//!
//! Each invocation runs one short, strictly sequential cycle: pick the most
//! important targets that are not cooling down, send each a tiny completion
//! request, classify the answer, and persist the outcome before moving on.
//! A rate-limit signal from the upstream suspends every target at once.
//!
//! # Modules
//!
//! - [`backoff`] - Exponential retry delay with server hints
//! - [`domain`] - Probe records, scheduler state and outcome types
//! - [`probe`] - Request shaping, HTTP transport and response classification
//! - [`scheduler`] - Eligibility, ordering and the priority pattern table
//! - [`store`] - Atomic JSON persistence of the scheduler state
//! - [`controller`] - Polling cycle and catalog refresh orchestration
//! - [`credential`] - Bearer token acquisition
//! - [`catalog`] - Model catalog listing and merge
//! - [`report`] - Status and preview rendering
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod backoff;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod controller;
pub mod credential;
pub mod domain;
pub mod probe;
pub mod report;
pub mod scheduler;
pub mod store;

pub use catalog::{CatalogEntry, CatalogError, CatalogSource, HttpCatalog, RefreshSummary};
pub use config::Config;
pub use controller::{ControllerError, CycleOutcome, ProbeReport, RunController};
pub use credential::{CommandCredential, CredentialError, CredentialSource, StaticCredential};
pub use domain::{OutcomeKind, Priority, ProbeOutcome, RateLimitInfo, SchedulerState, TargetRecord};
pub use probe::{HttpTransport, ProbeTransport, Prober};
pub use scheduler::{PriorityRule, PriorityTable};
pub use store::{StateStore, StoreError};

/// State file name used when the configuration does not name one
pub const DEFAULT_STATE_FILE: &str = "model-test-state.json";

/// Targets probed per cycle unless overridden
pub const DEFAULT_BATCH_SIZE: usize = 3;
