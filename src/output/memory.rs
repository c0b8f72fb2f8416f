//! In-memory sink

use super::traits::{CrawlRecord, OutputResult, Sink};
use crate::resource::ResourceKind;

/// Collects records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<CrawlRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[CrawlRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<CrawlRecord> {
        self.records
    }

    /// Records of one resource kind, in arrival order
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &CrawlRecord> + '_ {
        self.records.iter().filter(move |r| r.kind == kind)
    }
}

impl Sink for MemorySink {
    fn record(&mut self, record: &CrawlRecord) -> OutputResult<()> {
        self.records.push(record.clone());
        Ok(())
    }
}
