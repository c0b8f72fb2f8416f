//! Crawl statistics
//!
//! Workers and the driver bump shared atomic counters while a crawl runs;
//! a [`CrawlStatistics`] snapshot is taken when it ends.

use crate::resource::ResourceKind;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const KINDS: usize = ResourceKind::ALL.len();

/// Live counters shared by every task of one crawl
#[derive(Debug, Default)]
pub struct CrawlCounters {
    requests_seeded: AtomicU64,
    requests_queued: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    dropped_terminal: AtomicU64,
    dropped_exhausted: AtomicU64,
    malformed: AtomicU64,
    pages: [AtomicU64; KINDS],
    results: [AtomicU64; KINDS],
}

impl CrawlCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_seeded(&self) {
        self.requests_seeded.fetch_add(1, Ordering::Relaxed);
        self.requests_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queued(&self) {
        self.requests_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the attempts spent on one request
    pub fn record_attempts(&self, attempts: u32) {
        let attempts = u64::from(attempts);
        self.attempts.fetch_add(attempts, Ordering::Relaxed);
        self.retries
            .fetch_add(attempts.saturating_sub(1), Ordering::Relaxed);
    }

    pub fn record_terminal(&self) {
        self.dropped_terminal.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self) {
        self.dropped_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one page handed to the sink
    pub fn record_page(&self, kind: ResourceKind, num_results: usize) {
        self.pages[kind.index()].fetch_add(1, Ordering::Relaxed);
        self.results[kind.index()].fetch_add(num_results as u64, Ordering::Relaxed);
    }

    /// Takes a snapshot of the counters
    pub fn snapshot(&self, elapsed: Duration) -> CrawlStatistics {
        let per_kind = |counters: &[AtomicU64; KINDS]| {
            ResourceKind::ALL
                .iter()
                .map(|&kind| (kind, counters[kind.index()].load(Ordering::Relaxed)))
                .filter(|(_, count)| *count > 0)
                .collect::<BTreeMap<_, _>>()
        };

        CrawlStatistics {
            requests_seeded: self.requests_seeded.load(Ordering::Relaxed),
            requests_queued: self.requests_queued.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            dropped_terminal: self.dropped_terminal.load(Ordering::Relaxed),
            dropped_exhausted: self.dropped_exhausted.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            pages_by_kind: per_kind(&self.pages),
            results_by_kind: per_kind(&self.results),
            elapsed,
        }
    }
}

/// Crawl statistics summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlStatistics {
    /// First-page requests for root resources
    pub requests_seeded: u64,

    /// Every request pushed to the run-queue, seeds included
    pub requests_queued: u64,

    /// Remote calls made
    pub attempts: u64,

    /// Remote calls beyond the first for a request
    pub retries: u64,

    /// Requests dropped on a terminal error
    pub dropped_terminal: u64,

    /// Requests dropped after exhausting their attempts
    pub dropped_exhausted: u64,

    /// Pages whose payload did not hold the expected page
    pub malformed: u64,

    pub pages_by_kind: BTreeMap<ResourceKind, u64>,
    pub results_by_kind: BTreeMap<ResourceKind, u64>,

    pub elapsed: Duration,
}

impl CrawlStatistics {
    pub fn total_pages(&self) -> u64 {
        self.pages_by_kind.values().sum()
    }

    pub fn total_dropped(&self) -> u64 {
        self.dropped_terminal + self.dropped_exhausted
    }

    /// Merges another crawl's statistics into this one
    pub fn absorb(&mut self, other: &CrawlStatistics) {
        self.requests_seeded += other.requests_seeded;
        self.requests_queued += other.requests_queued;
        self.attempts += other.attempts;
        self.retries += other.retries;
        self.dropped_terminal += other.dropped_terminal;
        self.dropped_exhausted += other.dropped_exhausted;
        self.malformed += other.malformed;
        for (kind, count) in &other.pages_by_kind {
            *self.pages_by_kind.entry(*kind).or_insert(0) += count;
        }
        for (kind, count) in &other.results_by_kind {
            *self.results_by_kind.entry(*kind).or_insert(0) += count;
        }
        self.elapsed += other.elapsed;
    }
}

/// Prints statistics to stderr in a formatted manner
///
/// Stdout is reserved for crawl records.
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    eprintln!("=== Crawl Statistics ===\n");

    eprintln!("Overview:");
    eprintln!("  Requests seeded: {}", stats.requests_seeded);
    eprintln!("  Requests queued: {}", stats.requests_queued);
    eprintln!("  Pages fetched: {}", stats.total_pages());
    eprintln!(
        "  Remote calls: {} ({} retries)",
        stats.attempts, stats.retries
    );
    eprintln!("  Elapsed: {:.1}s", stats.elapsed.as_secs_f64());
    eprintln!();

    if !stats.pages_by_kind.is_empty() {
        eprintln!("Pages by Resource:");
        for (kind, pages) in &stats.pages_by_kind {
            let results = stats.results_by_kind.get(kind).copied().unwrap_or(0);
            eprintln!("  {}: {} pages, {} results", kind, pages, results);
        }
        eprintln!();
    }

    if stats.total_dropped() > 0 || stats.malformed > 0 {
        eprintln!("Dropped Requests:");
        eprintln!("  Terminal errors: {}", stats.dropped_terminal);
        eprintln!("  Retries exhausted: {}", stats.dropped_exhausted);
        eprintln!("  Malformed responses: {}", stats.malformed);
        eprintln!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = CrawlCounters::new();
        counters.record_seeded();
        counters.record_queued();
        counters.record_attempts(3);
        counters.record_attempts(1);
        counters.record_page(ResourceKind::RepoLangs, 100);
        counters.record_page(ResourceKind::RepoLangs, 74);
        counters.record_terminal();

        let stats = counters.snapshot(Duration::from_secs(2));
        assert_eq!(stats.requests_seeded, 1);
        assert_eq!(stats.requests_queued, 2);
        assert_eq!(stats.attempts, 4);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.pages_by_kind.get(&ResourceKind::RepoLangs), Some(&2));
        assert_eq!(stats.results_by_kind.get(&ResourceKind::RepoLangs), Some(&174));
        assert_eq!(stats.pages_by_kind.get(&ResourceKind::Repo), None);
        assert_eq!(stats.total_dropped(), 1);
    }

    #[test]
    fn test_absorb() {
        let mut total = CrawlStatistics::default();
        let counters = CrawlCounters::new();
        counters.record_page(ResourceKind::Repo, 1);
        let one = counters.snapshot(Duration::from_secs(1));

        total.absorb(&one);
        total.absorb(&one);
        assert_eq!(total.total_pages(), 2);
        assert_eq!(total.elapsed, Duration::from_secs(2));
    }
}
