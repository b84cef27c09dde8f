//! Integration tests for ModelProbe
//!
//! Drive the public API end to end with a scripted transport, and the `mp`
//! binary for the commands that never touch the network.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_cmd::Command;
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use modelprobe::config::ProbeConfig;
use modelprobe::probe::{HttpReply, TransportError};
use modelprobe::{
    CycleOutcome, OutcomeKind, Priority, ProbeTransport, Prober, RunController, SchedulerState, StateStore,
    StaticCredential, TargetRecord,
};
use predicates::prelude::*;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use tempfile::TempDir;

// =============================================================================
// Helpers
// =============================================================================

/// Replays canned replies and records request bodies
struct ScriptedTransport {
    replies: Mutex<VecDeque<HttpReply>>,
    bodies: Mutex<Vec<Value>>,
}

impl ScriptedTransport {
    fn new(replies: Vec<HttpReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            bodies: Mutex::new(Vec::new()),
        }
    }

    fn bodies(&self) -> Vec<Value> {
        self.bodies.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProbeTransport for ScriptedTransport {
    async fn post_json(&self, _url: &str, _token: &str, body: &Value) -> Result<HttpReply, TransportError> {
        self.bodies.lock().unwrap().push(body.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(TransportError::Timeout(Duration::from_secs(30)))
    }
}

fn http_reply(status: u16, headers: &[(&'static str, &'static str)], body: &str) -> HttpReply {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(*name, HeaderValue::from_static(value));
    }
    HttpReply {
        status,
        headers: map,
        body: body.to_string(),
    }
}

fn answer(content: &str) -> HttpReply {
    let body = serde_json::json!({"choices": [{"message": {"content": content}}]});
    http_reply(200, &[], &body.to_string())
}

fn controller(store: StateStore, transport: Arc<ScriptedTransport>) -> RunController {
    let prober = Prober::new(transport, ProbeConfig::default());
    RunController::new(store, prober, Arc::new(StaticCredential("token".to_string()))).with_delay(Duration::ZERO)
}

fn seeded_store(dir: &Path, targets: &[(&str, u8)]) -> StateStore {
    let store = StateStore::new(dir.join("model-test-state.json"));
    let mut state = SchedulerState::default();
    for (id, priority) in targets {
        state.upsert(TargetRecord::new(*id, Priority::new(*priority)));
    }
    store.save(&state).unwrap();
    store
}

// =============================================================================
// Run controller
// =============================================================================

#[tokio::test]
async fn test_mixed_batch_records_every_outcome() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(
        dir.path(),
        &[("openai/gpt-4o", 1), ("meta/llama", 2), ("cohere/command", 4)],
    );
    let transport = Arc::new(ScriptedTransport::new(vec![
        answer("4"),
        http_reply(200, &[], r#"{"choices":[{"message":{"content":"   "}}]}"#),
        http_reply(401, &[], r#"{"error":{"message":"Unauthorized"}}"#),
    ]));

    let outcome = controller(store.clone(), transport).run_cycle(3).await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Completed { .. }));

    let state = store.load().unwrap();
    let gpt = state.get("openai/gpt-4o").unwrap();
    assert_eq!(gpt.last_outcome, Some(OutcomeKind::Success));
    assert_eq!(gpt.backoff_level, 0);
    assert!(gpt.next_eligible_at.is_none());

    let llama = state.get("meta/llama").unwrap();
    assert_eq!(llama.last_outcome, Some(OutcomeKind::Failure));
    assert_eq!(llama.backoff_level, 1);
    assert!(llama.next_eligible_at.unwrap() > Utc::now() + TimeDelta::minutes(59));

    let cohere = state.get("cohere/command").unwrap();
    assert_eq!(cohere.last_outcome, Some(OutcomeKind::AuthError));
    assert_eq!(cohere.backoff_level, 1);
}

#[tokio::test]
async fn test_parameter_mismatch_retried_once() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(dir.path(), &[("openai/o3-mini", 1)]);
    let error = r#"{"error":{"message":"Unsupported parameter: 'max_tokens' is not supported with this model. Use 'max_completion_tokens' instead."}}"#;
    let transport = Arc::new(ScriptedTransport::new(vec![
        http_reply(400, &[], error),
        http_reply(400, &[], error),
    ]));

    let outcome = controller(store.clone(), transport.clone()).run_cycle(1).await.unwrap();

    let bodies = transport.bodies();
    assert_eq!(bodies.len(), 2);
    assert!(bodies[0].get("max_tokens").is_some());
    assert!(bodies[1].get("max_completion_tokens").is_some());
    assert!(bodies[1].get("max_tokens").is_none());
    assert!(outcome.probes()[0].outcome.retried);

    let record = store.load().unwrap().get("openai/o3-mini").cloned().unwrap();
    assert_eq!(record.last_outcome, Some(OutcomeKind::Failure));
}

#[tokio::test]
async fn test_cooldown_survives_across_invocations() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(dir.path(), &[("a/first", 1), ("b/second", 1)]);
    let transport = Arc::new(ScriptedTransport::new(vec![http_reply(
        429,
        &[("retry-after", "120"), ("x-ratelimit-remaining", "0")],
        "Too Many Requests",
    )]));
    controller(store.clone(), transport.clone()).run_cycle(2).await.unwrap();
    assert_eq!(transport.bodies().len(), 1);

    // A fresh controller over the same file sees the persisted cooldown
    let second = Arc::new(ScriptedTransport::new(vec![answer("4")]));
    let outcome = controller(store.clone(), second.clone()).run_cycle(2).await.unwrap();
    assert!(matches!(outcome, CycleOutcome::CoolingDown { .. }));
    assert!(second.bodies().is_empty());

    let state = store.load().unwrap();
    assert_eq!(state.rate_limit.as_ref().unwrap().remaining, Some(0));
}

// =============================================================================
// State store
// =============================================================================

#[test]
fn test_legacy_state_file_loads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model-test-state.json");
    fs::write(
        &path,
        r#"{
  "models": {
    "openai/gpt-4o": {
      "modelId": "openai/gpt-4o",
      "lastTestTime": 1735689600000,
      "testResult": "failure",
      "nextRetryTime": 1735696800000,
      "backoffLevel": 2,
      "priority": 1,
      "errorMessage": "HTTP 500",
      "responseTime": 812
    }
  },
  "globalBackoffUntil": 1735693200000,
  "rateLimitInfo": {"remaining": 3, "retryAfter": 60},
  "lastApiCall": 1735689600000
}"#,
    )
    .unwrap();

    let state = StateStore::new(&path).load().unwrap();
    let record = state.get("openai/gpt-4o").unwrap();
    assert_eq!(record.backoff_level, 2);
    assert_eq!(record.latency, Some(Duration::from_millis(812)));
    assert_eq!(record.last_outcome, Some(OutcomeKind::Failure));
    assert_eq!(state.rate_limit.as_ref().unwrap().retry_after, Some(60));
    assert!(state.global_cooldown_until.is_some());
}

// =============================================================================
// CLI
// =============================================================================

fn write_config(dir: &Path) -> std::path::PathBuf {
    let config = dir.join("modelprobe.yml");
    let state = dir.join("state.json");
    fs::write(&config, format!("state-file: {}\n", state.display())).unwrap();
    config
}

fn mp(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("mp").unwrap();
    cmd.current_dir(dir)
        .env("XDG_DATA_HOME", dir.join("data"))
        .env("XDG_CONFIG_HOME", dir.join("config"));
    cmd
}

#[test]
fn test_cli_requires_a_subcommand() {
    let dir = TempDir::new().unwrap();
    mp(dir.path()).assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_rejects_two_subcommands() {
    let dir = TempDir::new().unwrap();
    mp(dir.path()).args(["status", "reset"]).assert().failure();
}

#[test]
fn test_cli_rejects_zero_batch_size() {
    let dir = TempDir::new().unwrap();
    mp(dir.path()).args(["poll", "--batch-size", "0"]).assert().failure();
}

#[test]
fn test_cli_status_json_on_empty_state() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    mp(dir.path())
        .arg("-c")
        .arg(&config)
        .args(["status", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 0"));
}

#[test]
fn test_cli_next_on_empty_state() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    mp(dir.path())
        .arg("-c")
        .arg(&config)
        .arg("next")
        .assert()
        .success()
        .stdout(predicate::str::contains("No targets known"));
}

#[test]
fn test_cli_reset_removes_state() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let state = dir.path().join("state.json");
    fs::write(&state, "{}").unwrap();

    mp(dir.path())
        .arg("-c")
        .arg(&config)
        .arg("reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));
    assert!(!state.exists());

    mp(dir.path())
        .arg("-c")
        .arg(&config)
        .arg("reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("No state file"));
}

#[test]
fn test_cli_broken_local_config_is_logged() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".modelprobe.yml"), "probe: [not, a, map]\n").unwrap();

    mp(dir.path())
        .args(["status", "--format", "json"])
        .assert()
        .success();

    let log = fs::read_to_string(dir.path().join("data/modelprobe/logs/modelprobe.log")).unwrap();
    assert!(log.contains("Failed to load config from .modelprobe.yml"));
}

#[test]
fn test_cli_corrupt_state_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    fs::write(dir.path().join("state.json"), "{not json").unwrap();

    mp(dir.path()).arg("-c").arg(&config).arg("status").assert().failure();
}
