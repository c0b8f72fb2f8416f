//! Crawler coordinator - the driver loop
//!
//! This module contains the main crawl loop for one repository:
//! - Seeding the run-queue with first pages of enabled root resources
//! - Turning completed exchanges into follow-up requests
//! - Yielding every completed page to the sink
//! - Detecting completion and shutting the worker pool down

use super::retry::RetryPolicy;
use super::scheduler::{CrawlState, WorkerPool};
use super::{Exchange, Request};
use crate::config::{Config, CrawlerConfig};
use crate::output::{CrawlRecord, CrawlStatistics, Sink};
use crate::query::{Context, Params};
use crate::repo::RepoRef;
use crate::resource::{root_resources, ResourceKind};
use crate::transport::Transport;
use crate::{ContractViolation, TrawlError};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Drives crawls of individual repositories
///
/// One coordinator can run many crawls in turn; each crawl gets its own
/// queues and worker pool and shares nothing with the others but the
/// transport.
pub struct Coordinator {
    settings: CrawlerConfig,
    args: Params,
    enabled: BTreeSet<ResourceKind>,
    transport: Arc<dyn Transport>,
    shutdown: CancellationToken,
}

impl Coordinator {
    /// Creates a new coordinator
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `transport` - Executes built queries
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            settings: config.crawler.clone(),
            args: config.context_args(),
            enabled: config.enabled_kinds(),
            transport,
            shutdown: CancellationToken::new(),
        }
    }

    /// Uses `token` to interrupt running crawls
    ///
    /// Cancelling it stops the driver, leaving whatever was already yielded
    /// to the sink as the crawl's partial output.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Parameter context for a crawl of `repo`
    pub fn context_for(&self, repo: &RepoRef) -> Context {
        Context::new()
            .layer(self.args.clone())
            .layer(repo.context_params())
    }

    /// First-page requests for every enabled root resource
    pub fn seed_requests(&self, repo: &RepoRef) -> Result<Vec<Request>, ContractViolation> {
        let context = self.context_for(repo);
        root_resources()
            .filter(|resource| self.enabled.contains(&resource.kind))
            .map(|resource| Request::first_page(resource, &context))
            .collect()
    }

    /// Crawls one repository to completion
    ///
    /// # Arguments
    ///
    /// * `repo` - The repository to crawl
    /// * `sink` - Receives one record per completed page
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlStatistics)` - The crawl finished (or was interrupted)
    /// * `Err(TrawlError)` - A contract violation or sink failure stopped it
    pub async fn run(
        &self,
        repo: &RepoRef,
        sink: &mut dyn Sink,
    ) -> Result<CrawlStatistics, TrawlError> {
        let start = Instant::now();
        let context = self.context_for(repo);
        let seeds = self.seed_requests(repo)?;

        let state = Arc::new(CrawlState::new(self.settings.workers.max(1) as usize));
        tracing::info!(
            "Crawling {}: {} root requests, {} workers",
            repo,
            seeds.len(),
            state.workers()
        );
        for request in seeds {
            tracing::debug!(request = %request.log_id(), "Seeding request");
            state.counters.record_seeded();
            state.run_queue.push(request);
        }

        let pool = WorkerPool::spawn(
            Arc::clone(&state),
            Arc::clone(&self.transport),
            RetryPolicy::from_config(&self.settings),
            Duration::from_millis(self.settings.request_timeout_ms),
            Duration::from_millis(self.settings.shutdown_grace_ms),
        );

        let outcome = self.drive(&state, &context, sink).await;
        pool.shutdown().await;
        outcome?;
        sink.finalize()?;

        let stats = state.counters.snapshot(start.elapsed());
        tracing::info!(
            "Crawl of {} completed: {} pages, {} dropped requests in {:?}",
            repo,
            stats.total_pages(),
            stats.total_dropped(),
            stats.elapsed
        );
        Ok(stats)
    }

    /// Runs the driver loop until the crawl is idle
    async fn drive(
        &self,
        state: &CrawlState,
        context: &Context,
        sink: &mut dyn Sink,
    ) -> Result<(), TrawlError> {
        let poll = Duration::from_millis(self.settings.poll_interval_ms);
        let mut iterations: u64 = 0;

        loop {
            if let Some(violation) = state.take_fatal() {
                tracing::error!("Aborting crawl: {}", violation);
                return Err(violation.into());
            }

            match state.write_queue.try_pop() {
                Some(exchange) => self.handle_exchange(state, context, exchange, sink)?,
                None => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            tracing::warn!(
                                "Crawl interrupted with {} requests queued and {} in flight",
                                state.run_queue.len(),
                                state.pending_count()
                            );
                            return Ok(());
                        }
                        _ = tokio::time::sleep(poll) => {}
                    }
                }
            }

            iterations += 1;
            if iterations % 100 == 0 {
                tracing::debug!(
                    "Queues: {} to run, {} in flight, {} to write",
                    state.run_queue.len(),
                    state.pending_count(),
                    state.write_queue.len()
                );
            }

            if state.is_idle() {
                // a worker may have raised a violation just before going idle
                if let Some(violation) = state.take_fatal() {
                    tracing::error!("Aborting crawl: {}", violation);
                    return Err(violation.into());
                }
                tracing::debug!("Crawl idle after {} driver iterations", iterations);
                return Ok(());
            }
        }
    }

    /// Queues an exchange's follow-ups and yields its page to the sink
    fn handle_exchange(
        &self,
        state: &CrawlState,
        context: &Context,
        exchange: Exchange,
        sink: &mut dyn Sink,
    ) -> Result<(), TrawlError> {
        if exchange.response.is_malformed() {
            tracing::warn!(
                request = %exchange.request.log_id(),
                "Dropping malformed response"
            );
            state.counters.record_malformed();
            return Ok(());
        }

        for request in exchange.follow_ups(context, &self.enabled)? {
            tracing::debug!(
                request = %request.log_id(),
                parent = %exchange.request.log_id(),
                "Queueing follow-up request"
            );
            state.counters.record_queued();
            state.run_queue.push(request);
        }

        let record = CrawlRecord::from_exchange(&exchange);
        state.counters.record_page(record.kind, record.num_results);
        sink.record(&record)?;
        Ok(())
    }
}

/// Crawls one repository with a fresh coordinator
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `repo` - The repository to crawl
/// * `transport` - Executes built queries
/// * `sink` - Receives one record per completed page
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Crawl completed
/// * `Err(TrawlError)` - Crawl failed with an error
///
/// # Example
///
/// ```no_run
/// use repo_trawler::config::load_config;
/// use repo_trawler::output::JsonlSink;
/// use repo_trawler::{crawl, GithubTransport, RepoRef};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("trawler.toml"))?;
/// let transport = Arc::new(GithubTransport::from_config(&config.github)?);
/// let mut sink = JsonlSink::stdout();
/// let repo = RepoRef::parse("mozilla/normandy")?;
/// let stats = crawl(&config, &repo, transport, &mut sink).await?;
/// println!("{} pages", stats.total_pages());
/// # Ok(())
/// # }
/// ```
pub async fn crawl(
    config: &Config,
    repo: &RepoRef,
    transport: Arc<dyn Transport>,
    sink: &mut dyn Sink,
) -> Result<CrawlStatistics, TrawlError> {
    Coordinator::new(config, transport).run(repo, sink).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemorySink;
    use crate::query::Query;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct RepoOnly;

    #[async_trait]
    impl Transport for RepoOnly {
        async fn execute(&self, _query: &Query) -> Result<Value, TransportError> {
            Ok(json!({ "repository": { "id": "R_1", "name": "normandy" } }))
        }
    }

    fn create_test_config(enabled: &[&str]) -> Config {
        let mut config = Config::default();
        config.crawler.poll_interval_ms = 5;
        config.crawler.request_timeout_ms = 10;
        config.resources.enabled = enabled.iter().map(|s| s.to_string()).collect();
        config
    }

    #[test]
    fn test_seed_requests_cover_enabled_roots() {
        let config = create_test_config(&["REPO", "REPO_LANGS", "REPO_DEP_MANIFEST_DEPS"]);
        let coordinator = Coordinator::new(&config, Arc::new(RepoOnly));
        let seeds = coordinator
            .seed_requests(&RepoRef::new("mozilla", "normandy"))
            .unwrap();

        let kinds: Vec<_> = seeds.iter().map(|r| r.resource().kind).collect();
        assert_eq!(kinds, vec![ResourceKind::Repo, ResourceKind::RepoLangs]);
        assert!(seeds.iter().all(|r| r.page_number() == 0));
    }

    #[tokio::test]
    async fn test_crawl_single_root() {
        let config = create_test_config(&["REPO"]);
        let mut sink = MemorySink::new();

        let stats = crawl(
            &config,
            &RepoRef::new("mozilla", "normandy"),
            Arc::new(RepoOnly),
            &mut sink,
        )
        .await
        .unwrap();

        assert_eq!(sink.records().len(), 1);
        assert_eq!(sink.records()[0].kind, ResourceKind::Repo);
        assert_eq!(stats.requests_seeded, 1);
        assert_eq!(stats.total_pages(), 1);
    }

    #[tokio::test]
    async fn test_crawl_with_nothing_enabled_finishes() {
        let config = create_test_config(&[]);
        let mut sink = MemorySink::new();

        let stats = crawl(
            &config,
            &RepoRef::new("mozilla", "normandy"),
            Arc::new(RepoOnly),
            &mut sink,
        )
        .await
        .unwrap();

        assert!(sink.records().is_empty());
        assert_eq!(stats.requests_seeded, 0);
    }

    #[tokio::test]
    async fn test_malformed_response_is_dropped() {
        // languages requested, but the payload has no languages connection
        let config = create_test_config(&["REPO_LANGS"]);
        let mut sink = MemorySink::new();

        let stats = crawl(
            &config,
            &RepoRef::new("mozilla", "normandy"),
            Arc::new(RepoOnly),
            &mut sink,
        )
        .await
        .unwrap();

        assert!(sink.records().is_empty());
        assert_eq!(stats.malformed, 1);
    }
}
