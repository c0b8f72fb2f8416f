//! Sink trait and record types
//!
//! This module defines the trait interface for crawl sinks and the record
//! emitted for every completed exchange.

use crate::crawler::Exchange;
use crate::resource::ResourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// One fetched page, tagged with the resource it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRecord {
    pub kind: ResourceKind,

    /// Repository owner, absent for resources not scoped to a repository
    pub owner: Option<String>,

    /// Repository name
    pub name: Option<String>,

    pub page_number: u32,
    pub request_id: Uuid,
    pub fetched_at: DateTime<Utc>,

    /// Items on this page
    pub num_results: usize,

    /// Items across every page, as declared by the API
    pub total_results: Option<u64>,

    /// The `data` object returned by the API
    pub data: serde_json::Value,
}

impl CrawlRecord {
    /// Builds the record for a completed exchange
    pub fn from_exchange(exchange: &Exchange) -> Self {
        let request = &exchange.request;
        let response = &exchange.response;
        let (owner, name) = match request.owner_and_name() {
            Some((owner, name)) => (Some(owner.to_string()), Some(name.to_string())),
            None => (None, None),
        };

        Self {
            kind: request.resource().kind,
            owner,
            name,
            page_number: request.page_number(),
            request_id: request.id(),
            fetched_at: Utc::now(),
            num_results: response.num_results(),
            total_results: response.total_results(),
            data: response.payload().cloned().unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Trait for crawl sinks
///
/// A sink receives one record per completed exchange, in whatever order the
/// driver produces them. Records of different resources interleave freely.
pub trait Sink: Send {
    /// Records one fetched page
    ///
    /// # Arguments
    ///
    /// * `record` - The page and its provenance
    fn record(&mut self, record: &CrawlRecord) -> OutputResult<()>;

    /// Flushes buffered output once a crawl has finished
    fn finalize(&mut self) -> OutputResult<()> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn record(&mut self, record: &CrawlRecord) -> OutputResult<()> {
        (**self).record(record)
    }

    fn finalize(&mut self) -> OutputResult<()> {
        (**self).finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{Request, Response};
    use crate::query::{Context, Params};
    use crate::resource::{resource, templates};
    use serde_json::json;

    #[test]
    fn test_record_from_exchange() {
        let mut entity = Params::new();
        entity.insert(templates::OWNER.to_string(), "mozilla".into());
        entity.insert(templates::NAME.to_string(), "normandy".into());
        let repo = resource(ResourceKind::Repo);
        let request = Request::first_page(repo, &Context::new().layer(entity)).unwrap();
        let request_id = request.id();
        let payload = json!({ "repository": { "id": "R_1", "name": "normandy" } });
        let exchange = Exchange::new(request, Response::new(repo, Some(payload.clone())));

        let record = CrawlRecord::from_exchange(&exchange);
        assert_eq!(record.kind, ResourceKind::Repo);
        assert_eq!(record.owner.as_deref(), Some("mozilla"));
        assert_eq!(record.name.as_deref(), Some("normandy"));
        assert_eq!(record.request_id, request_id);
        assert_eq!(record.page_number, 0);
        assert_eq!(record.data, payload);
    }

    #[test]
    fn test_record_serializes_kind_name() {
        let rate_limit = resource(ResourceKind::RateLimit);
        let request = Request::first_page(rate_limit, &Context::new()).unwrap();
        let exchange = Exchange::new(
            request,
            Response::new(rate_limit, Some(json!({ "rateLimit": { "remaining": 4999 } }))),
        );

        let value = serde_json::to_value(CrawlRecord::from_exchange(&exchange)).unwrap();
        assert_eq!(value["kind"], "RATE_LIMIT");
        assert_eq!(value["owner"], serde_json::Value::Null);
        assert_eq!(value["data"]["rateLimit"]["remaining"], 4999);
    }
}
