//! Target catalog
//!
//! Lists the targets the upstream currently offers and merges them into the
//! scheduler state with priorities from the pattern table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{SchedulerState, TargetRecord};
use crate::scheduler::PriorityTable;

/// Errors fetching the catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog authentication failed; the token may be invalid or expired")]
    Unauthorized,

    #[error("Catalog access forbidden")]
    Forbidden,

    #[error("Catalog request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid catalog response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One target descriptor as listed by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub publisher: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_family: Option<String>,
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            publisher: String::new(),
            model_family: None,
        }
    }
}

/// Lists available targets
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list(&self, token: &str) -> Result<Vec<CatalogEntry>, CatalogError>;
}

/// Catalog fetched over HTTP
pub struct HttpCatalog {
    url: String,
    http: Client,
}

impl HttpCatalog {
    pub fn new(url: impl Into<String>, http: Client) -> Self {
        Self { url: url.into(), http }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalog {
    async fn list(&self, token: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
        debug!(url = %self.url, "HttpCatalog::list: called");
        let response = self
            .http
            .get(&self.url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status().as_u16();
        match status {
            401 => return Err(CatalogError::Unauthorized),
            403 => return Err(CatalogError::Forbidden),
            _ if !response.status().is_success() => {
                let message = response.text().await.unwrap_or_default();
                return Err(CatalogError::Status { status, message });
            }
            _ => {}
        }

        let text = response.text().await?;
        let entries: Vec<CatalogEntry> = serde_json::from_str(&text)?;
        info!(count = entries.len(), "Fetched catalog");
        Ok(entries)
    }
}

/// Result of merging a catalog listing into the state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    /// Entries in the listing
    pub total: usize,

    /// Identifiers seen for the first time
    pub added: Vec<String>,

    /// Known identifiers whose computed priority changed
    pub reprioritized: Vec<String>,
}

/// Merge catalog entries into the state
///
/// New identifiers become untested records; known identifiers keep their
/// history and only have their priority updated when the table now says
/// otherwise. Identifiers missing from the listing are left untouched.
pub fn merge_catalog(
    state: &mut SchedulerState,
    entries: &[CatalogEntry],
    table: &PriorityTable,
    now: DateTime<Utc>,
) -> RefreshSummary {
    debug!(entries = entries.len(), "merge_catalog: called");
    let mut summary = RefreshSummary {
        total: entries.len(),
        ..Default::default()
    };

    for entry in entries {
        let priority = table.priority_for(&entry.id);
        match state.get_mut(&entry.id) {
            Some(record) => {
                if record.priority != priority {
                    debug!(model = %entry.id, from = %record.priority, to = %priority, "merge_catalog: priority changed");
                    record.priority = priority;
                    summary.reprioritized.push(entry.id.clone());
                }
            }
            None => {
                state.upsert(TargetRecord::new(entry.id.clone(), priority));
                summary.added.push(entry.id.clone());
            }
        }
    }

    state.last_refresh_at = Some(now);
    summary
}
