//! Crawler module for paginated GraphQL resources
//!
//! This module contains the core crawling logic, including:
//! - Requests, responses, and the follow-up work derived from them
//! - Retry with exponential backoff around the transport
//! - The shared work queues and the worker pool draining them
//! - Overall crawl coordination

mod coordinator;
mod exchange;
mod queue;
mod request;
mod response;
mod retry;
mod scheduler;

pub use coordinator::{crawl, Coordinator};
pub use exchange::Exchange;
pub use queue::WorkQueue;
pub use request::Request;
pub use response::{get_in, Response};
pub use retry::{Attempted, RetryError, RetryPolicy};
pub use scheduler::{CrawlState, WorkerPool};
