//! NOTAM data gateway
//!
//! The dashboard talks to its data source through [`NotamGateway`]. Two adapters ship
//! with the crate: [`HttpNotamGateway`] for a REST backend and [`InMemoryGateway`]
//! for a fixed record set (local files, tests).

mod http;
mod memory;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::filters::FilterState;
use crate::notams::NotamRecord;

pub use http::HttpNotamGateway;
pub use memory::InMemoryGateway;

/// Opaque bearer credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// How an authentication failure was reported upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Unauthorized,
    Forbidden,
}

impl AuthStatus {
    pub fn code(&self) -> u16 {
        match self {
            AuthStatus::Unauthorized => 401,
            AuthStatus::Forbidden => 403,
        }
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthStatus::Unauthorized => write!(f, "401 Unauthorized"),
            AuthStatus::Forbidden => write!(f, "403 Forbidden"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("authentication rejected ({0})")]
    Auth(AuthStatus),
    #[error("NOTAM {0} not found")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        match status {
            401 => GatewayError::Auth(AuthStatus::Unauthorized),
            403 => GatewayError::Auth(AuthStatus::Forbidden),
            _ => GatewayError::Transport(format!("HTTP {}: {}", status, detail.into())),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, GatewayError::Auth(_))
    }

    /// Status classification: 401, 403, or `None` for everything else
    pub fn status_code(&self) -> Option<u16> {
        match self {
            GatewayError::Auth(status) => Some(status.code()),
            _ => None,
        }
    }

    /// Text shown to the user for a failed `operation` ("load", "search", ...)
    pub fn user_message(&self, operation: &str) -> String {
        match self {
            GatewayError::Auth(status) => format!(
                "Not authorized ({}). Your session is being renewed; please retry the {}.",
                status, operation
            ),
            GatewayError::NotFound(id) => format!("NOTAM {} is no longer available.", id),
            GatewayError::Transport(_) => format!(
                "Failed to {} NOTAM data. Please try again later.",
                operation
            ),
        }
    }

    pub fn metric_label(&self) -> &'static str {
        match self {
            GatewayError::Auth(_) => "auth_error",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::Transport(_) => "transport_error",
        }
    }
}

/// Remote NOTAM source
#[async_trait]
pub trait NotamGateway: Send + Sync {
    /// Records matching the structured filters (region, category, date floor, altitude)
    async fn fetch_list(
        &self,
        filters: &FilterState,
        credential: &Credential,
    ) -> Result<Vec<NotamRecord>, GatewayError>;

    /// Free-text search; the result replaces the working set
    async fn search(&self, term: &str, credential: &Credential) -> Result<Vec<NotamRecord>, GatewayError>;

    /// Full record for one NOTAM
    async fn fetch_detail(&self, id: &str, credential: &Credential) -> Result<NotamRecord, GatewayError>;
}

/// Supplies the credential for gateway calls and renews it on request
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn token(&self) -> Credential;

    /// Obtain a fresh credential after an authentication failure
    async fn refresh_token(&self) -> anyhow::Result<()>;
}

/// Credential read from configuration, re-read from the environment on refresh
pub struct StaticCredentials {
    token: RwLock<Credential>,
    env_var: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Credential::new(token)),
            env_var: None,
        }
    }

    /// Token taken from `env_var` now and again on every refresh
    pub fn from_env(env_var: impl Into<String>) -> Self {
        let env_var = env_var.into();
        let token = std::env::var(&env_var).unwrap_or_default();
        Self {
            token: RwLock::new(Credential::new(token)),
            env_var: Some(env_var),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn token(&self) -> Credential {
        self.token.read().await.clone()
    }

    async fn refresh_token(&self) -> anyhow::Result<()> {
        let Some(env_var) = &self.env_var else {
            debug!("Static credential has no source to refresh from");
            return Ok(());
        };
        let fresh = std::env::var(env_var)
            .map_err(|e| anyhow::anyhow!("Failed to re-read {}: {}", env_var, e))?;
        *self.token.write().await = Credential::new(fresh);
        info!("Reloaded API token from {}", env_var);
        Ok(())
    }
}
