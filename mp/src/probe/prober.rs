//! Target prober
//!
//! Sends one minimal chat request to a target and turns whatever comes back,
//! including network failures, into a classified [`ProbeOutcome`]. Nothing
//! escapes this boundary as an error.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use super::classifier::{self, EMPTY_CONTENT_DETAIL};
use super::request::RequestShape;
use super::transport::{HttpReply, ProbeTransport, TransportError};
use crate::config::ProbeConfig;
use crate::domain::{OutcomeKind, ProbeOutcome, RateLimitInfo};

/// Issues probes against the inference endpoint
pub struct Prober {
    transport: Arc<dyn ProbeTransport>,
    config: ProbeConfig,
}

impl Prober {
    pub fn new(transport: Arc<dyn ProbeTransport>, config: ProbeConfig) -> Self {
        debug!(url = %config.inference_url, "Prober::new: called");
        Self { transport, config }
    }

    /// Probe one target
    ///
    /// A parameter-shape rejection on the first attempt triggers exactly one
    /// retry with a reduced parameter set; the retry's result is final.
    pub async fn probe(&self, target: &str, credential: &str) -> ProbeOutcome {
        debug!(%target, "Prober::probe: called");
        let started = Instant::now();
        let shape = RequestShape::for_target(target, &self.config.completion_token_markers);

        let reply = match self.send(target, credential, shape).await {
            Ok(reply) => reply,
            Err(e) => return transport_failure(e, started),
        };

        let kind = classifier::classify(reply.status, &reply.headers, &reply.body);
        if kind == OutcomeKind::Failure && !classifier::is_success_status(reply.status) {
            let message = classifier::error_message(&reply.body);
            if let Some(retry_shape) = shape.adjusted_for(&message) {
                info!(%target, ?retry_shape, "Prober::probe: retrying with adjusted parameters");
                let first_telemetry = RateLimitInfo::from_headers(&reply.headers);
                let mut outcome = match self.send(target, credential, retry_shape).await {
                    Ok(retry_reply) => {
                        let retry_kind = classifier::classify(retry_reply.status, &retry_reply.headers, &retry_reply.body);
                        finish(retry_reply, retry_kind, started)
                    }
                    Err(e) => transport_failure(e, started),
                };
                outcome.retried = true;
                if outcome.rate_limit.is_none() {
                    outcome.rate_limit = first_telemetry;
                }
                return outcome;
            }
        }

        finish(reply, kind, started)
    }

    async fn send(&self, target: &str, credential: &str, shape: RequestShape) -> Result<HttpReply, TransportError> {
        let body = shape.body(target, &self.config.prompt, self.config.max_tokens);
        self.transport
            .post_json(&self.config.inference_url, credential, &body)
            .await
    }
}

fn finish(reply: HttpReply, kind: OutcomeKind, started: Instant) -> ProbeOutcome {
    let error = match kind {
        OutcomeKind::Success => None,
        _ if classifier::is_success_status(reply.status) => Some(EMPTY_CONTENT_DETAIL.to_string()),
        _ => {
            let message = classifier::error_message(&reply.body);
            if message.is_empty() {
                Some(format!("HTTP {}", reply.status))
            } else {
                Some(message)
            }
        }
    };
    let outcome = ProbeOutcome {
        kind,
        latency: started.elapsed(),
        error,
        rate_limit: RateLimitInfo::from_headers(&reply.headers),
        retried: false,
    };
    debug!(status = reply.status, kind = %outcome.kind, latency_ms = outcome.latency.as_millis(), "finish: classified");
    outcome
}

fn transport_failure(error: TransportError, started: Instant) -> ProbeOutcome {
    debug!(%error, "transport_failure: called");
    ProbeOutcome {
        kind: OutcomeKind::Failure,
        latency: started.elapsed(),
        error: Some(error.to_string()),
        rate_limit: None,
        retried: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::transport::mock::{MockStep, MockTransport, answer, reply};

    fn prober(transport: Arc<MockTransport>) -> Prober {
        Prober::new(transport, ProbeConfig::default())
    }

    #[tokio::test]
    async fn test_probe_success() {
        let transport = Arc::new(MockTransport::replies(vec![answer("4")]));
        let outcome = prober(transport.clone()).probe("openai/gpt-4o", "token").await;

        assert!(outcome.is_success());
        assert!(outcome.error.is_none());
        assert!(!outcome.retried);
        assert_eq!(transport.call_count(), 1);

        let sent = &transport.requests()[0];
        assert_eq!(sent["model"], "openai/gpt-4o");
        assert_eq!(sent["messages"][0]["content"], ProbeConfig::default().prompt);
        assert_eq!(sent["max_tokens"], 10);
        assert_eq!(sent["temperature"], 0);
    }

    #[tokio::test]
    async fn test_probe_whitespace_answer_fails() {
        let body = r#"{"choices":[{"message":{"content":"   "}}]}"#;
        let transport = Arc::new(MockTransport::replies(vec![reply(200, &[], body)]));
        let outcome = prober(transport).probe("openai/gpt-4o", "token").await;

        assert_eq!(outcome.kind, OutcomeKind::Failure);
        assert_eq!(outcome.error.as_deref(), Some(EMPTY_CONTENT_DETAIL));
    }

    #[tokio::test]
    async fn test_probe_rate_limited_carries_hint() {
        let transport = Arc::new(MockTransport::replies(vec![reply(429, &[("retry-after", "120")], "")]));
        let outcome = prober(transport.clone()).probe("openai/gpt-4o", "token").await;

        assert_eq!(outcome.kind, OutcomeKind::RateLimited);
        assert_eq!(outcome.retry_after(), Some(120));
        assert_eq!(outcome.error.as_deref(), Some("HTTP 429"));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_probe_timeout_is_failure() {
        let transport = Arc::new(MockTransport::new(vec![MockStep::Timeout]));
        let outcome = prober(transport).probe("openai/gpt-4o", "token").await;

        assert_eq!(outcome.kind, OutcomeKind::Failure);
        assert!(outcome.error.unwrap().contains("Timeout"));
    }

    #[tokio::test]
    async fn test_shape_mismatch_retries_once_and_succeeds() {
        let error = r#"{"error":{"message":"Unsupported parameter: 'max_tokens' is not supported with this model. Use 'max_completion_tokens' instead."}}"#;
        let transport = Arc::new(MockTransport::replies(vec![reply(400, &[], error), answer("4")]));
        let outcome = prober(transport.clone()).probe("openai/gpt-4.1", "token").await;

        assert!(outcome.is_success());
        assert!(outcome.retried);
        assert_eq!(transport.call_count(), 2);

        let retry = &transport.requests()[1];
        assert_eq!(retry["max_completion_tokens"], 10);
        assert!(retry.get("max_tokens").is_none());
        assert!(retry.get("temperature").is_none());
    }

    #[tokio::test]
    async fn test_shape_mismatch_second_failure_is_reported_as_is() {
        let first = r#"{"error":{"message":"Use max_completion_tokens instead of max_tokens"}}"#;
        let second = r#"{"error":{"message":"Use max_tokens instead of max_completion_tokens"}}"#;
        let transport = Arc::new(MockTransport::replies(vec![
            reply(400, &[], first),
            reply(400, &[], second),
            answer("never sent"),
        ]));
        let outcome = prober(transport.clone()).probe("openai/gpt-4.1", "token").await;

        assert_eq!(outcome.kind, OutcomeKind::Failure);
        assert!(outcome.retried);
        assert_eq!(outcome.error.as_deref(), Some("Use max_tokens instead of max_completion_tokens"));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_completion_token_target_retries_with_completion_tokens() {
        let error = r#"{"error":{"message":"Unsupported parameter: 'max_tokens' is not supported with this model. Use 'max_completion_tokens' instead."}}"#;
        let transport = Arc::new(MockTransport::replies(vec![reply(400, &[], error), reply(400, &[], error)]));
        let outcome = prober(transport.clone()).probe("openai/o1-mini", "token").await;

        assert_eq!(outcome.kind, OutcomeKind::Failure);
        assert!(outcome.retried);
        assert_eq!(transport.call_count(), 2);
        for sent in transport.requests() {
            assert_eq!(sent["max_completion_tokens"], 10);
            assert!(sent.get("max_tokens").is_none());
        }
    }

    #[tokio::test]
    async fn test_retry_transport_failure_is_failure() {
        let first = r#"{"error":{"message":"temperature is not supported"}}"#;
        let transport = Arc::new(MockTransport::new(vec![
            MockStep::Reply(reply(400, &[("x-ratelimit-remaining", "7")], first)),
            MockStep::Timeout,
        ]));
        let outcome = prober(transport.clone()).probe("deepseek/deepseek-r1", "token").await;

        assert_eq!(outcome.kind, OutcomeKind::Failure);
        assert!(outcome.retried);
        assert_eq!(outcome.rate_limit.unwrap().remaining, Some(7));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_auth_error_is_not_retried() {
        let body = r#"{"error":{"message":"Unsupported parameter max_tokens for unauthorized callers"}}"#;
        let transport = Arc::new(MockTransport::replies(vec![reply(403, &[], body)]));
        let outcome = prober(transport.clone()).probe("openai/gpt-4o", "token").await;

        assert_eq!(outcome.kind, OutcomeKind::AuthError);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_family_marker_request_shape() {
        let transport = Arc::new(MockTransport::replies(vec![answer("4")]));
        prober(transport.clone()).probe("openai/gpt-5-mini", "token").await;

        let sent = &transport.requests()[0];
        assert_eq!(sent["max_completion_tokens"], 10);
        assert!(sent.get("temperature").is_none());
    }
}
