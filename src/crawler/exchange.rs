//! Exchanges: completed requests paired with their responses
//!
//! Deriving follow-up work is pure. The next page of the same resource
//! comes from the response's end cursor; first pages of child resources are
//! scoped to the page the request itself fetched.

use super::{Request, Response};
use crate::query::{Context, Params};
use crate::resource::{templates, ResourceKind};
use crate::ContractViolation;
use std::collections::BTreeSet;

/// A satisfied request and its response
#[derive(Debug, Clone)]
pub struct Exchange {
    pub request: Request,
    pub response: Response,
}

impl Exchange {
    pub fn new(request: Request, response: Response) -> Self {
        Self { request, response }
    }

    /// The continuation of this resource, if the API signalled another page
    pub fn next_page_request(&self) -> Result<Option<Request>, ContractViolation> {
        match self.response.end_cursor() {
            Some(cursor) => self.request.continuation(cursor).map(Some),
            None => Ok(None),
        }
    }

    /// First-page requests for every enabled child resource
    ///
    /// # Arguments
    ///
    /// * `context` - Run-time arguments (page sizes)
    /// * `enabled` - Resource kinds the caller allows
    ///
    /// # Returns
    ///
    /// Child requests whose `parent_after` is this request's own `after`
    /// value, so each child page is scoped to the parent page just fetched.
    pub fn next_nested_page_requests(
        &self,
        context: &Context,
        enabled: &BTreeSet<ResourceKind>,
    ) -> Result<Vec<Request>, ContractViolation> {
        let resource = self.request.resource();
        if resource.children().next().is_none() || self.response.num_results() == 0 {
            return Ok(Vec::new());
        }

        let mut parent = Params::new();
        parent.insert(
            templates::PARENT_AFTER.to_string(),
            self.request.after_value(),
        );

        let mut entity = Params::new();
        if let Some((owner, name)) = self.request.owner_and_name() {
            entity.insert(templates::OWNER.to_string(), owner.into());
            entity.insert(templates::NAME.to_string(), name.into());
        }

        let child_context = context.clone().overlay(parent).layer(entity);

        let mut requests = Vec::new();
        for child in resource.children() {
            if !enabled.contains(&child.kind) {
                tracing::debug!(
                    request = %self.request.log_id(),
                    "Skipping child resource {} (not enabled)",
                    child.kind
                );
                continue;
            }
            requests.push(Request::first_page(child, &child_context)?);
        }
        Ok(requests)
    }

    /// Every follow-up request derived from this exchange
    ///
    /// A malformed response yields no follow-ups.
    pub fn follow_ups(
        &self,
        context: &Context,
        enabled: &BTreeSet<ResourceKind>,
    ) -> Result<Vec<Request>, ContractViolation> {
        if self.response.is_malformed() {
            tracing::warn!(
                request = %self.request.log_id(),
                "Malformed response, deriving no follow-up requests"
            );
            return Ok(Vec::new());
        }

        let mut requests = Vec::new();
        if let Some(next) = self.next_page_request()? {
            requests.push(next);
        }
        requests.extend(self.next_nested_page_requests(context, enabled)?);
        Ok(requests)
    }
}
