use crate::query::Params;
use crate::resource::{templates, ResourceKind};
use serde::Deserialize;
use std::collections::BTreeSet;

/// Main configuration structure for Repo-Trawler
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "page-sizes", default)]
    pub page_sizes: PageSizeConfig,
    #[serde(default)]
    pub resources: ResourceConfig,
    #[serde(default)]
    pub github: GithubConfig,
}

impl Config {
    /// Run-time argument layer of the parameter context
    ///
    /// Maps each page-size context key to its configured value.
    pub fn context_args(&self) -> Params {
        let sizes = &self.page_sizes;
        [
            (templates::LANGS_PAGE_SIZE, sizes.repo_langs),
            (templates::DEP_MANIFESTS_PAGE_SIZE, sizes.repo_dep_manifests),
            (templates::DEP_MANIFEST_DEPS_PAGE_SIZE, sizes.repo_dep_manifest_deps),
            (templates::VULN_ALERTS_PAGE_SIZE, sizes.repo_vuln_alerts),
            (templates::VULN_ALERT_VULNS_PAGE_SIZE, sizes.repo_vuln_alert_vulns),
        ]
        .into_iter()
        .map(|(key, size)| (key.to_string(), size.into()))
        .collect()
    }

    /// Resource kinds allowed in this crawl
    ///
    /// Names that do not parse are ignored here; validation rejects them.
    pub fn enabled_kinds(&self) -> BTreeSet<ResourceKind> {
        self.resources
            .enabled
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect()
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent worker tasks
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Attempts per request before it is dropped
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Driver sleep when no exchange is waiting (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Worker wait on an empty run-queue before re-checking shutdown (milliseconds)
    #[serde(rename = "request-timeout-ms", default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Grace period for workers to exit before they are cancelled (milliseconds)
    #[serde(rename = "shutdown-grace-ms", default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// First retry delay (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Longest retry delay before jitter (milliseconds)
    #[serde(rename = "backoff-max-ms", default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Fraction of each delay added at random
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            jitter: default_jitter(),
        }
    }
}

/// Page size per paginated resource
#[derive(Debug, Clone, Deserialize)]
pub struct PageSizeConfig {
    #[serde(rename = "repo-langs", default = "default_langs_page_size")]
    pub repo_langs: u32,

    #[serde(rename = "repo-dep-manifests", default = "default_parent_page_size")]
    pub repo_dep_manifests: u32,

    #[serde(rename = "repo-dep-manifest-deps", default = "default_deps_page_size")]
    pub repo_dep_manifest_deps: u32,

    #[serde(rename = "repo-vuln-alerts", default = "default_parent_page_size")]
    pub repo_vuln_alerts: u32,

    #[serde(rename = "repo-vuln-alert-vulns", default = "default_vulns_page_size")]
    pub repo_vuln_alert_vulns: u32,
}

impl Default for PageSizeConfig {
    fn default() -> Self {
        Self {
            repo_langs: default_langs_page_size(),
            repo_dep_manifests: default_parent_page_size(),
            repo_dep_manifest_deps: default_deps_page_size(),
            repo_vuln_alerts: default_parent_page_size(),
            repo_vuln_alert_vulns: default_vulns_page_size(),
        }
    }
}

/// Resource allowlist
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    /// Names of the resource kinds to crawl (e.g. "REPO_LANGS")
    #[serde(default = "default_enabled")]
    pub enabled: Vec<String>,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
        }
    }
}

/// GitHub API access
#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    /// GraphQL endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Environment variable holding the access token
    #[serde(rename = "token-env", default = "default_token_env")]
    pub token_env: String,

    /// Media types sent in the Accept header (schema previews)
    #[serde(default = "default_accept")]
    pub accept: Vec<String>,

    /// Whole-request HTTP timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            user_agent: default_user_agent(),
            token_env: default_token_env(),
            accept: default_accept(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_workers() -> u32 {
    3
}

fn default_max_attempts() -> u32 {
    5
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_request_timeout_ms() -> u64 {
    2000
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_jitter() -> f64 {
    0.25
}

fn default_langs_page_size() -> u32 {
    25
}

// nested resources are scoped to the first item of a parent page
fn default_parent_page_size() -> u32 {
    1
}

fn default_deps_page_size() -> u32 {
    100
}

fn default_vulns_page_size() -> u32 {
    25
}

fn default_enabled() -> Vec<String> {
    ResourceKind::ALL
        .iter()
        .map(|kind| kind.name().to_string())
        .collect()
}

fn default_endpoint() -> String {
    "https://api.github.com/graphql".to_string()
}

fn default_user_agent() -> String {
    concat!("repo-trawler/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_token_env() -> String {
    "GITHUB_PAT".to_string()
}

fn default_accept() -> Vec<String> {
    vec![
        "application/vnd.github.hawkgirl-preview+json".to_string(),
        "application/vnd.github.vixen-preview+json".to_string(),
    ]
}

fn default_timeout_secs() -> u64 {
    30
}
