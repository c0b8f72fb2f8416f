//! Remote transport for built queries
//!
//! The crawler calls a [`Transport`] once per attempt. Errors come back as
//! a typed [`TransportError`] whose kind decides whether retrying can help.

mod github;

pub use github::GithubTransport;

use crate::query::Query;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failure of a single remote call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Rate limiting, server errors, network hiccups
    #[error("transient: {0}")]
    Transient(String),

    /// The addressed entity does not exist, or the call can never succeed
    #[error("terminal: {0}")]
    Terminal(String),
}

impl TransportError {
    /// Give-up predicate: retrying a terminal error is pointless
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

/// Executes fully bound queries against the remote API
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one query and returns the `data` object of the result
    async fn execute(&self, query: &Query) -> Result<Value, TransportError>;
}
