//! Process-wide persisted aggregate

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::outcome::RateLimitInfo;
use super::record::TargetRecord;

/// Everything the scheduler remembers between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerState {
    /// Target identifier -> probe history
    #[serde(rename = "models", default)]
    pub targets: BTreeMap<String, TargetRecord>,

    /// Blocks all probing while in the future
    #[serde(
        rename = "globalBackoffUntil",
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub global_cooldown_until: Option<DateTime<Utc>>,

    /// Latest telemetry observed from the upstream
    #[serde(rename = "rateLimitInfo", default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitInfo>,

    /// When the last polling cycle finished
    #[serde(
        rename = "lastApiCall",
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub last_cycle_at: Option<DateTime<Utc>>,

    /// When the catalog was last refreshed
    #[serde(
        rename = "lastResearchTime",
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub last_refresh_at: Option<DateTime<Utc>>,
}

impl SchedulerState {
    /// True while the global cooldown extends past `now`
    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.global_cooldown_until.is_some_and(|until| until > now)
    }

    /// Time left on the global cooldown, if active
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        self.global_cooldown_until.filter(|until| *until > now).map(|until| until - now)
    }

    /// Insert or replace a record under its own identifier
    pub fn upsert(&mut self, record: TargetRecord) {
        self.targets.insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<&TargetRecord> {
        self.targets.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TargetRecord> {
        self.targets.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
