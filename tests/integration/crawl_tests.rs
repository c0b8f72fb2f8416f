//! Integration tests for the crawler
//!
//! These tests drive whole crawls against an in-memory fake of the GitHub
//! GraphQL API. The fake paginates synthetic repositories using cursors of
//! the form `cursor:<offset>` and records every query it receives.

use async_trait::async_trait;
use repo_trawler::config::Config;
use repo_trawler::output::{JsonlSink, MemorySink};
use repo_trawler::query::{get_kwargs_at, Field, ParamValue, Query};
use repo_trawler::{crawl, CrawlRecord, RepoRef, ResourceKind, Transport, TransportError};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

const MANIFESTS: &[&str] = &["repository", "dependencyGraphManifests"];
const MANIFEST_DEPS: &[&str] = &[
    "repository",
    "dependencyGraphManifests",
    "edges",
    "node",
    "dependencies",
];

/// Synthetic contents of one repository
#[derive(Debug, Clone, Default)]
struct FakeRepo {
    languages: usize,
    /// Dependency count of each manifest
    manifests: Vec<usize>,
    /// Vulnerability count of each alert
    alerts: Vec<usize>,
}

#[derive(Default)]
struct FakeGithub {
    repos: HashMap<String, FakeRepo>,
    queries: Mutex<Vec<Query>>,
    calls: AtomicUsize,
    /// Fail every other call with a transient error
    flaky: bool,
    /// Hold every call until permits are added
    gate: Option<Semaphore>,
}

impl FakeGithub {
    fn with_repo(owner: &str, name: &str, repo: FakeRepo) -> Self {
        let mut repos = HashMap::new();
        repos.insert(format!("{}/{}", owner, name), repo);
        Self {
            repos,
            ..Self::default()
        }
    }

    fn queries(&self) -> Vec<Query> {
        self.queries.lock().unwrap().clone()
    }

    fn respond(&self, query: &Query) -> Result<Value, TransportError> {
        let root = query
            .fields()
            .first()
            .ok_or_else(|| TransportError::Terminal("empty query".to_string()))?;
        match root.name.as_str() {
            "rateLimit" => Ok(json!({
                "rateLimit": {
                    "limit": 5000,
                    "cost": 1,
                    "remaining": 4999,
                    "resetAt": "2026-01-01T00:00:00Z"
                }
            })),
            "repository" => self.repository(root),
            other => Err(TransportError::Terminal(format!("unknown field {}", other))),
        }
    }

    fn repository(&self, field: &Field) -> Result<Value, TransportError> {
        let owner = field.params.get("owner").and_then(ParamValue::as_str);
        let name = field.params.get("name").and_then(ParamValue::as_str);
        let key = format!("{}/{}", owner.unwrap_or(""), name.unwrap_or(""));
        let repo = self
            .repos
            .get(&key)
            .ok_or_else(|| TransportError::Terminal(format!("NOT_FOUND: {}", key)))?;

        let mut body = json!({ "id": format!("R_{}", key), "databaseId": 1, "name": name });
        for child in &field.children {
            match child.name.as_str() {
                "languages" => {
                    body["languages"] = connection(child, repo.languages, "edges", language);
                }
                "dependencyGraphManifests" => {
                    let deps = find(child, &["edges", "node", "dependencies"]);
                    body["dependencyGraphManifests"] =
                        connection(child, repo.manifests.len(), "edges", |i| {
                            manifest(i, deps, repo.manifests[i])
                        });
                }
                "vulnerabilityAlerts" => {
                    let path = ["edges", "node", "securityAdvisory", "vulnerabilities"];
                    let vulns = find(child, &path);
                    body["vulnerabilityAlerts"] =
                        connection(child, repo.alerts.len(), "edges", |i| {
                            alert(i, vulns, repo.alerts[i])
                        });
                }
                _ => {}
            }
        }
        Ok(json!({ "repository": body }))
    }
}

#[async_trait]
impl Transport for FakeGithub {
    async fn execute(&self, query: &Query) -> Result<Value, TransportError> {
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| TransportError::Terminal(e.to_string()))?;
        }
        self.queries.lock().unwrap().push(query.clone());
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.flaky && call % 2 == 0 {
            return Err(TransportError::Transient("HTTP 502".to_string()));
        }
        self.respond(query)
    }
}

fn language(i: usize) -> Value {
    json!({ "node": { "id": format!("L_{}", i), "name": format!("lang-{}", i) } })
}

fn manifest(i: usize, deps: Option<&Field>, count: usize) -> Value {
    let dependencies = deps.map_or(Value::Null, |deps| {
        connection(deps, count, "nodes", |j| {
            json!({ "packageName": format!("pkg-{}-{}", i, j) })
        })
    });
    json!({
        "node": {
            "id": format!("M_{}", i),
            "filename": format!("manifest-{}.txt", i),
            "dependencies": dependencies
        }
    })
}

fn alert(i: usize, vulns: Option<&Field>, count: usize) -> Value {
    let vulnerabilities = vulns.map_or(Value::Null, |vulns| {
        connection(vulns, count, "nodes", |j| {
            json!({ "severity": "HIGH", "package": { "name": format!("pkg-{}", j) } })
        })
    });
    json!({
        "node": {
            "id": format!("A_{}", i),
            "securityAdvisory": {
                "id": format!("GA_{}", i),
                "ghsaId": format!("GHSA-{}", i),
                "vulnerabilities": vulnerabilities
            }
        }
    })
}

fn find<'a>(field: &'a Field, path: &[&str]) -> Option<&'a Field> {
    path.iter().try_fold(field, |current, name| {
        current.children.iter().find(|child| child.name == *name)
    })
}

fn cursor_offset(after: Option<&ParamValue>) -> usize {
    after
        .and_then(ParamValue::as_str)
        .and_then(|cursor| cursor.strip_prefix("cursor:"))
        .and_then(|offset| offset.parse().ok())
        .unwrap_or(0)
}

/// One page of a connection, honoring the field's `first`/`after` arguments
fn connection(field: &Field, total: usize, key: &str, item: impl Fn(usize) -> Value) -> Value {
    let first = field
        .params
        .get("first")
        .and_then(ParamValue::as_int)
        .unwrap_or(100) as usize;
    let start = cursor_offset(field.params.get("after")).min(total);
    let end = (start + first).min(total);

    let mut page = json!({
        "totalCount": total,
        "pageInfo": {
            "hasNextPage": end < total,
            "endCursor": format!("cursor:{}", end)
        }
    });
    page[key] = Value::Array((start..end).map(item).collect());
    page
}

fn create_test_config(workers: u32, enabled: &[ResourceKind]) -> Config {
    let mut config = Config::default();
    config.crawler.workers = workers;
    config.crawler.poll_interval_ms = 2;
    config.crawler.request_timeout_ms = 10;
    config.crawler.shutdown_grace_ms = 500;
    config.crawler.backoff_base_ms = 1;
    config.crawler.backoff_max_ms = 8;
    config.crawler.jitter = 0.0;
    config.page_sizes.repo_langs = 100;
    config.page_sizes.repo_dep_manifest_deps = 100;
    config.page_sizes.repo_vuln_alert_vulns = 25;
    config.resources.enabled = enabled.iter().map(|kind| kind.name().to_string()).collect();
    config
}

fn normandy() -> RepoRef {
    RepoRef::new("mozilla", "normandy")
}

fn full_repo() -> FakeRepo {
    FakeRepo {
        languages: 674,
        manifests: vec![150, 0, 30],
        alerts: vec![2, 30],
    }
}

fn results_of(records: &[CrawlRecord], kind: ResourceKind) -> usize {
    records
        .iter()
        .filter(|record| record.kind == kind)
        .map(|record| record.num_results)
        .sum()
}

#[tokio::test]
async fn test_full_crawl_pages_every_language() {
    let fake = Arc::new(FakeGithub::with_repo("mozilla", "normandy", full_repo()));
    let config = create_test_config(3, &[ResourceKind::RepoLangs]);
    let mut sink = MemorySink::new();

    let stats = crawl(&config, &normandy(), fake.clone(), &mut sink)
        .await
        .expect("crawl should succeed");

    let pages: Vec<_> = sink.of_kind(ResourceKind::RepoLangs).collect();
    assert_eq!(pages.len(), 7);
    let numbers: BTreeSet<u32> = pages.iter().map(|p| p.page_number).collect();
    assert_eq!(numbers, (0..7).collect());
    assert_eq!(results_of(sink.records(), ResourceKind::RepoLangs), 674);
    assert!(pages.iter().all(|p| p.total_results == Some(674)));
    assert!(pages
        .iter()
        .all(|p| p.owner.as_deref() == Some("mozilla") && p.name.as_deref() == Some("normandy")));

    assert_eq!(stats.requests_seeded, 1);
    assert_eq!(stats.pages_by_kind.get(&ResourceKind::RepoLangs), Some(&7));
    assert_eq!(stats.total_dropped(), 0);
    assert_eq!(fake.calls.load(Ordering::SeqCst), 7);
}

#[tokio::test]
async fn test_no_query_reaches_transport_unresolved() {
    let fake = Arc::new(FakeGithub::with_repo("mozilla", "normandy", full_repo()));
    let config = create_test_config(3, &ResourceKind::ALL);
    let mut sink = MemorySink::new();

    crawl(&config, &normandy(), fake.clone(), &mut sink)
        .await
        .expect("crawl should succeed");

    let queries = fake.queries();
    assert!(!queries.is_empty());
    for query in &queries {
        assert!(query.unresolved().is_empty(), "unresolved query: {}", query);
    }
}

#[tokio::test]
async fn test_nested_resources_are_scoped_to_parent_pages() {
    let fake = Arc::new(FakeGithub::with_repo("mozilla", "normandy", full_repo()));
    let config = create_test_config(3, &ResourceKind::ALL);
    let mut sink = MemorySink::new();

    let stats = crawl(&config, &normandy(), fake.clone(), &mut sink)
        .await
        .expect("crawl should succeed");
    let records = sink.records();

    // one manifest per parent page, each followed by its own dependencies
    assert_eq!(sink.of_kind(ResourceKind::RepoDepManifests).count(), 3);
    assert_eq!(sink.of_kind(ResourceKind::RepoDepManifestDeps).count(), 4);
    assert_eq!(results_of(records, ResourceKind::RepoDepManifestDeps), 180);

    assert_eq!(sink.of_kind(ResourceKind::RepoVulnAlerts).count(), 2);
    assert_eq!(sink.of_kind(ResourceKind::RepoVulnAlertVulns).count(), 3);
    assert_eq!(results_of(records, ResourceKind::RepoVulnAlertVulns), 32);

    assert_eq!(sink.of_kind(ResourceKind::Repo).count(), 1);
    assert_eq!(sink.of_kind(ResourceKind::RateLimit).count(), 1);
    assert_eq!(stats.requests_seeded, 5);

    // child first pages bind the parent cursor of the page they came from
    let parent_cursors: BTreeSet<Option<String>> = fake
        .queries()
        .iter()
        .filter(|query| {
            get_kwargs_at(query, MANIFEST_DEPS)
                .and_then(|kwargs| kwargs.get("first"))
                .and_then(ParamValue::as_int)
                == Some(100)
        })
        .filter(|query| {
            get_kwargs_at(query, MANIFEST_DEPS).map_or(true, |kwargs| {
                kwargs.get("after").map_or(true, |after| *after == ParamValue::Null)
            })
        })
        .map(|query| {
            get_kwargs_at(query, MANIFESTS)
                .and_then(|kwargs| kwargs.get("after"))
                .and_then(ParamValue::as_str)
                .map(str::to_string)
        })
        .collect();
    let expected: BTreeSet<Option<String>> = [
        None,
        Some("cursor:1".to_string()),
        Some("cursor:2".to_string()),
    ]
    .into_iter()
    .collect();
    assert_eq!(parent_cursors, expected);
}

#[tokio::test]
async fn test_worker_counts_produce_identical_output() {
    let mut totals = Vec::new();

    for workers in [1, 3, 8] {
        let fake = Arc::new(FakeGithub::with_repo("mozilla", "normandy", full_repo()));
        let config = create_test_config(workers, &ResourceKind::ALL);
        let mut sink = MemorySink::new();

        let stats = tokio::time::timeout(
            Duration::from_secs(10),
            crawl(&config, &normandy(), fake, &mut sink),
        )
        .await
        .expect("crawl should terminate")
        .expect("crawl should succeed");

        let mut seen: Vec<(ResourceKind, u32, usize)> = sink
            .records()
            .iter()
            .map(|r| (r.kind, r.page_number, r.num_results))
            .collect();
        seen.sort();
        totals.push((stats.pages_by_kind.clone(), stats.results_by_kind.clone(), seen));
    }

    assert_eq!(totals[0], totals[1]);
    assert_eq!(totals[1], totals[2]);
}

#[tokio::test]
async fn test_missing_repository_drops_requests() {
    let fake = Arc::new(FakeGithub::with_repo("mozilla", "normandy", full_repo()));
    let config = create_test_config(3, &ResourceKind::ALL);
    let mut sink = MemorySink::new();

    let stats = crawl(&config, &RepoRef::new("mozilla", "gone"), fake.clone(), &mut sink)
        .await
        .expect("a missing repository is not a crawl failure");

    // only the rate limit is not scoped to the repository
    assert_eq!(sink.records().len(), 1);
    assert_eq!(sink.records()[0].kind, ResourceKind::RateLimit);
    assert_eq!(stats.dropped_terminal, 4);
    assert_eq!(stats.dropped_exhausted, 0);
    assert_eq!(stats.retries, 0, "terminal errors are never retried");
    assert_eq!(fake.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let fake = Arc::new(FakeGithub {
        flaky: true,
        ..FakeGithub::with_repo("mozilla", "normandy", full_repo())
    });
    // one worker keeps the alternating failures deterministic
    let config = create_test_config(1, &[ResourceKind::Repo, ResourceKind::RepoLangs]);
    let mut sink = MemorySink::new();

    let stats = crawl(&config, &normandy(), fake.clone(), &mut sink)
        .await
        .expect("crawl should succeed");

    assert_eq!(sink.of_kind(ResourceKind::RepoLangs).count(), 7);
    assert_eq!(results_of(sink.records(), ResourceKind::RepoLangs), 674);
    assert_eq!(sink.of_kind(ResourceKind::Repo).count(), 1);
    assert_eq!(stats.retries, 8);
    assert_eq!(stats.attempts, 16);
    assert_eq!(stats.total_dropped(), 0);
}

#[tokio::test]
async fn test_exhausted_requests_are_dropped() {
    struct AlwaysDown;

    #[async_trait]
    impl Transport for AlwaysDown {
        async fn execute(&self, _query: &Query) -> Result<Value, TransportError> {
            Err(TransportError::Transient("HTTP 503".to_string()))
        }
    }

    let mut config = create_test_config(2, &[ResourceKind::Repo, ResourceKind::RepoLangs]);
    config.crawler.max_attempts = 3;
    let mut sink = MemorySink::new();

    let stats = crawl(&config, &normandy(), Arc::new(AlwaysDown), &mut sink)
        .await
        .expect("dropped requests are not a crawl failure");

    assert!(sink.records().is_empty());
    assert_eq!(stats.dropped_exhausted, 2);
    assert_eq!(stats.attempts, 6);
}

#[tokio::test]
async fn test_crawl_waits_for_in_flight_request() {
    let fake = Arc::new(FakeGithub {
        gate: Some(Semaphore::new(0)),
        ..FakeGithub::with_repo("mozilla", "normandy", full_repo())
    });
    let config = create_test_config(3, &[ResourceKind::Repo]);

    let handle = tokio::spawn({
        let fake = fake.clone();
        async move {
            let mut sink = MemorySink::new();
            let stats = crawl(&config, &normandy(), fake, &mut sink).await;
            (stats, sink)
        }
    });

    // queues are empty while the only request is held by a worker
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!handle.is_finished(), "crawl finished with a request in flight");

    fake.gate.as_ref().unwrap().add_permits(1);
    let (stats, sink) = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("crawl should terminate")
        .unwrap();

    let stats = stats.expect("crawl should succeed");
    assert_eq!(sink.records().len(), 1);
    assert_eq!(stats.total_pages(), 1);
}

#[tokio::test]
async fn test_disabled_children_are_not_crawled() {
    let fake = Arc::new(FakeGithub::with_repo("mozilla", "normandy", full_repo()));
    let config = create_test_config(
        3,
        &[ResourceKind::RepoDepManifests, ResourceKind::RepoVulnAlerts],
    );
    let mut sink = MemorySink::new();

    crawl(&config, &normandy(), fake.clone(), &mut sink)
        .await
        .expect("crawl should succeed");

    assert_eq!(sink.of_kind(ResourceKind::RepoDepManifests).count(), 3);
    assert_eq!(sink.of_kind(ResourceKind::RepoVulnAlerts).count(), 2);
    assert_eq!(sink.of_kind(ResourceKind::RepoDepManifestDeps).count(), 0);
    assert_eq!(sink.of_kind(ResourceKind::RepoVulnAlertVulns).count(), 0);
    assert_eq!(fake.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_crawl_to_jsonl() {
    let fake = Arc::new(FakeGithub::with_repo("mozilla", "normandy", full_repo()));
    let config = create_test_config(3, &[ResourceKind::Repo, ResourceKind::RepoLangs]);
    let mut sink = JsonlSink::new(Vec::new());

    let stats = crawl(&config, &normandy(), fake, &mut sink)
        .await
        .expect("crawl should succeed");
    assert_eq!(sink.records_written(), 8);

    let output = String::from_utf8(sink.into_inner().unwrap()).unwrap();
    let records: Vec<CrawlRecord> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len() as u64, stats.total_pages());
    assert_eq!(results_of(&records, ResourceKind::RepoLangs), 674);
}
