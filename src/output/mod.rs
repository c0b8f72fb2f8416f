//! Output module for crawl records and statistics
//!
//! This module handles:
//! - The sink interface every completed exchange is yielded to
//! - JSON Lines and in-memory sinks
//! - Recording and printing crawl statistics

mod jsonl;
mod memory;
pub mod stats;
mod traits;

pub use jsonl::JsonlSink;
pub use memory::MemorySink;
pub use stats::{print_statistics, CrawlCounters, CrawlStatistics};
pub use traits::{CrawlRecord, OutputError, OutputResult, Sink};
