//! HTTP transport for probe requests
//!
//! The prober only needs "POST this JSON with a bearer token and give me the
//! status, headers and body back". Keeping that behind a trait lets tests
//! replay canned upstream replies.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors raised before an HTTP response was received
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),
}

/// A received HTTP response, fully read
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

/// Sends one JSON POST and returns the raw reply
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn post_json(&self, url: &str, token: &str, body: &Value) -> Result<HttpReply, TransportError>;
}

/// reqwest-backed transport with a mandatory per-request timeout
pub struct HttpTransport {
    http: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        Self::from_builder(Client::builder(), timeout)
    }

    fn from_builder(builder: ClientBuilder, timeout: Duration) -> Result<Self, TransportError> {
        debug!(?timeout, "HttpTransport::from_builder: called");
        let http = builder
            .timeout(timeout)
            .user_agent(concat!("modelprobe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, timeout })
    }

    /// Shared client, reused by the catalog source
    pub fn client(&self) -> &Client {
        &self.http
    }
}

#[async_trait]
impl ProbeTransport for HttpTransport {
    async fn post_json(&self, url: &str, token: &str, body: &Value) -> Result<HttpReply, TransportError> {
        debug!(%url, "HttpTransport::post_json: called");
        let timeout = self.timeout;
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::Timeout(timeout)
            } else {
                TransportError::Network(e)
            }
        };

        let response = self
            .http
            .post(url)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(map_err)?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(map_err)?;
        debug!(status, body_len = body.len(), "HttpTransport::post_json: reply received");

        Ok(HttpReply { status, headers, body })
    }
}
