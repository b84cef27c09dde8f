//! Bearer token retrieval
//!
//! The token comes from an environment variable when one is configured and
//! set, otherwise from the stdout of an external command (`gh auth token` by
//! default). Any failure here is fatal to the invocation.

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::CredentialConfig;

/// Errors obtaining a credential
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Not authenticated: {0}. Run 'gh auth login' first.")]
    NotAuthenticated(String),

    #[error("Credential command '{0}' not found")]
    CommandNotFound(String),

    #[error("Credential command failed: {0}")]
    CommandFailed(String),

    #[error("Credential command produced an empty token")]
    Empty,

    #[error("No credential command configured")]
    NoCommand,
}

/// Yields the bearer token used for every upstream call
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn token(&self) -> Result<String, CredentialError>;
}

/// Environment variable first, external command second
pub struct CommandCredential {
    token_env: Option<String>,
    program: String,
    args: Vec<String>,
}

impl CommandCredential {
    pub fn from_config(config: &CredentialConfig) -> Self {
        let mut parts = config.command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self {
            token_env: config.token_env.clone().filter(|name| !name.is_empty()),
            program,
            args: parts.collect(),
        }
    }

    fn env_token(&self) -> Option<String> {
        let name = self.token_env.as_ref()?;
        std::env::var(name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

#[async_trait]
impl CredentialSource for CommandCredential {
    async fn token(&self) -> Result<String, CredentialError> {
        if let Some(token) = self.env_token() {
            debug!(env = ?self.token_env, "CommandCredential::token: using environment");
            return Ok(token);
        }

        if self.program.is_empty() {
            return Err(CredentialError::NoCommand);
        }

        debug!(program = %self.program, "CommandCredential::token: running command");
        let output = match Command::new(&self.program).args(&self.args).output().await {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CredentialError::CommandNotFound(self.program.clone()));
            }
            Err(e) => return Err(CredentialError::CommandFailed(e.to_string())),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let lower = stderr.to_lowercase();
            if lower.contains("not logged in") || lower.contains("authentication") {
                return Err(CredentialError::NotAuthenticated(stderr));
            }
            return Err(CredentialError::CommandFailed(stderr));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(CredentialError::Empty);
        }
        Ok(token)
    }
}

/// A fixed token
pub struct StaticCredential(pub String);

#[async_trait]
impl CredentialSource for StaticCredential {
    async fn token(&self) -> Result<String, CredentialError> {
        Ok(self.0.clone())
    }
}
