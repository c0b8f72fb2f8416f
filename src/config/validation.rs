use crate::config::types::{Config, CrawlerConfig, GithubConfig, PageSizeConfig, ResourceConfig};
use crate::resource::ResourceKind;
use crate::ConfigError;
use reqwest::header::HeaderValue;
use url::Url;

/// Largest page GitHub serves for a connection
const MAX_PAGE_SIZE: u32 = 100;

/// Upper bound on concurrent workers
const MAX_WORKERS: u32 = 64;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_page_sizes(&config.page_sizes)?;
    validate_resources(&config.resources)?;
    validate_nested_scoping(config)?;
    validate_github_config(&config.github)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.workers
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "poll-interval-ms must be > 0".to_string(),
        ));
    }

    if config.request_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-ms must be > 0".to_string(),
        ));
    }

    if config.backoff_base_ms > config.backoff_max_ms {
        return Err(ConfigError::Validation(format!(
            "backoff-base-ms ({}) must not exceed backoff-max-ms ({})",
            config.backoff_base_ms, config.backoff_max_ms
        )));
    }

    if config.backoff_base_ms == 0 {
        return Err(ConfigError::Validation(
            "backoff-base-ms must be > 0".to_string(),
        ));
    }

    // the delay after the last failed attempt must not be capped
    let exponent = config.max_attempts.saturating_sub(2);
    let longest = 1u64
        .checked_shl(exponent)
        .and_then(|factor| config.backoff_base_ms.checked_mul(factor));
    if !longest.map_or(false, |delay| delay <= config.backoff_max_ms) {
        return Err(ConfigError::Validation(format!(
            "backoff-max-ms ({}) is reached before the last of {} attempts; \
             raise it to at least backoff-base-ms * 2^{}",
            config.backoff_max_ms, config.max_attempts, exponent
        )));
    }

    if !(0.0..1.0).contains(&config.jitter) {
        return Err(ConfigError::Validation(format!(
            "jitter must be in [0, 1), got {}",
            config.jitter
        )));
    }

    Ok(())
}

/// Validates page sizes
fn validate_page_sizes(config: &PageSizeConfig) -> Result<(), ConfigError> {
    for (name, size) in [
        ("repo-langs", config.repo_langs),
        ("repo-dep-manifests", config.repo_dep_manifests),
        ("repo-dep-manifest-deps", config.repo_dep_manifest_deps),
        ("repo-vuln-alerts", config.repo_vuln_alerts),
        ("repo-vuln-alert-vulns", config.repo_vuln_alert_vulns),
    ] {
        if size < 1 || size > MAX_PAGE_SIZE {
            return Err(ConfigError::Validation(format!(
                "page size {} must be between 1 and {}, got {}",
                name, MAX_PAGE_SIZE, size
            )));
        }
    }

    Ok(())
}

/// Validates the resource allowlist
fn validate_resources(config: &ResourceConfig) -> Result<(), ConfigError> {
    for name in &config.enabled {
        name.parse::<ResourceKind>()
            .map_err(ConfigError::InvalidResourceKind)?;
    }
    Ok(())
}

/// Checks that parents of enabled nested resources fetch one item per page
///
/// A child's first page is scoped to the first edge of its parent page, so
/// any other items on a larger parent page would never get their children
/// crawled.
fn validate_nested_scoping(config: &Config) -> Result<(), ConfigError> {
    let enabled = config.enabled_kinds();
    let sizes = &config.page_sizes;

    for (child, parent_size, parent_key) in [
        (
            ResourceKind::RepoDepManifestDeps,
            sizes.repo_dep_manifests,
            "repo-dep-manifests",
        ),
        (
            ResourceKind::RepoVulnAlertVulns,
            sizes.repo_vuln_alerts,
            "repo-vuln-alerts",
        ),
    ] {
        if enabled.contains(&child) && parent_size != 1 {
            return Err(ConfigError::Validation(format!(
                "{} must be 1 while {} is enabled, got {}",
                parent_key, child, parent_size
            )));
        }
    }

    Ok(())
}

/// Validates GitHub access configuration
fn validate_github_config(config: &GithubConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.endpoint).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid endpoint '{}': {}", config.endpoint, e))
    })?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::Validation(format!(
            "endpoint '{}' must use HTTP or HTTPS",
            config.endpoint
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.token_env.is_empty() {
        return Err(ConfigError::Validation(
            "token-env cannot be empty".to_string(),
        ));
    }

    if config.accept.is_empty() {
        return Err(ConfigError::Validation(
            "accept must list at least one media type".to_string(),
        ));
    }

    HeaderValue::from_str(&config.accept.join(",")).map_err(|e| {
        ConfigError::Validation(format!(
            "accept media types {:?} are not a valid header value: {}",
            config.accept, e
        ))
    })?;

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be > 0".to_string(),
        ));
    }

    Ok(())
}
