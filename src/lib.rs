//! Repo-Trawler: a crawler for paginated GitHub GraphQL resources
//!
//! This crate walks a repository's nested collections (languages, dependency
//! manifests and their dependencies, vulnerability alerts and their
//! vulnerabilities) one page per request, threading cursors across parent and
//! child resources and emitting every page exactly once.

pub mod config;
pub mod crawler;
pub mod output;
pub mod query;
pub mod repo;
pub mod resource;
pub mod transport;

use thiserror::Error;

/// Main error type for Repo-Trawler operations
#[derive(Debug, Error)]
pub enum TrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Contract violation: {0}")]
    Contract(#[from] ContractViolation),

    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unknown resource kind in config: {0}")]
    InvalidResourceKind(String),
}

/// Programming-logic faults in the catalog or the diff engine
///
/// These are never retried; they mean the crawl cannot make correct progress.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("unresolved placeholder '{key}' at {path}")]
    UnresolvedPlaceholder { path: String, key: String },

    #[error("no context value for required parameter '{key}'")]
    MissingContextKey { key: String },

    #[error("no field at selection path {path}")]
    PathNotFound { path: String },
}

/// Errors identifying the repository under crawl
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Failed to parse repository reference: {0}")]
    Parse(String),

    #[error("Not a GitHub repository URL: {0}")]
    NotGithub(String),

    #[error("Invalid input line: {0}")]
    InvalidLine(#[from] serde_json::Error),
}

/// Result type alias for Repo-Trawler operations
pub type Result<T> = std::result::Result<T, TrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{crawl, Coordinator, Exchange, Request, Response};
pub use output::{CrawlRecord, CrawlStatistics, Sink};
pub use repo::RepoRef;
pub use resource::{Resource, ResourceKind};
pub use transport::{GithubTransport, Transport, TransportError};
