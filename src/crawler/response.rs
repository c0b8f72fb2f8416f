//! Responses: parsed results of executed requests
//!
//! Pagination metadata is read strictly through the resource's page path.
//! An absent or malformed payload degrades every derived property to
//! `None`/`0` instead of failing.

use crate::resource::{PathElem, Resource};
use serde_json::Value;

/// The parsed result of executing a [`Request`](super::Request)
#[derive(Debug, Clone)]
pub struct Response {
    resource: &'static Resource,
    payload: Option<Value>,
}

impl Response {
    pub fn new(resource: &'static Resource, payload: Option<Value>) -> Self {
        Self { resource, payload }
    }

    pub fn resource(&self) -> &'static Resource {
        self.resource
    }

    /// The raw `data` object returned by the API
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Returns true if the payload does not hold this resource's page
    pub fn is_malformed(&self) -> bool {
        !self.page().map_or(false, Value::is_object)
    }

    /// Cursor of the next page, present only if the API signalled one
    pub fn end_cursor(&self) -> Option<&str> {
        let page_info = self.page()?.get("pageInfo")?;
        if page_info.get("hasNextPage")?.as_bool()? {
            page_info.get("endCursor")?.as_str()
        } else {
            None
        }
    }

    /// Number of items on this page
    pub fn num_results(&self) -> usize {
        self.page()
            .and_then(|page| page.get(self.resource.results_key()))
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    /// Total items across every page of this resource, as declared by the API
    pub fn total_results(&self) -> Option<u64> {
        self.page()?.get("totalCount")?.as_u64()
    }

    fn page(&self) -> Option<&Value> {
        get_in(self.payload.as_ref()?, self.resource.page_path)
    }
}

/// Walks `path` through nested JSON objects and arrays
pub fn get_in<'a>(value: &'a Value, path: &[PathElem]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, elem| match elem {
        PathElem::Key(key) => current.get(*key),
        PathElem::Index(index) => current.get(*index),
    })
}
