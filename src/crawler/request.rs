//! Requests: immutable, fully specified page fetches
//!
//! A [`Request`] records which resource it fetches, the ordered parameter
//! edits applied on top of the resource's template, and its page number.
//! The concrete query is built (and checked for unbound placeholders) when
//! the request is constructed, so a request that exists is always sendable.

use crate::query::{
    apply_edits, get_kwargs_at, resolve_placeholders, Context, ParamValue, Params, Query,
    SelectionUpdate,
};
use crate::resource::{templates, Resource};
use crate::ContractViolation;
use uuid::Uuid;

/// A single page fetch
#[derive(Debug, Clone)]
pub struct Request {
    resource: &'static Resource,
    selection_updates: Vec<SelectionUpdate>,
    page_number: u32,
    id: Uuid,
    query: Query,
}

impl Request {
    /// Builds the first-page request for a resource
    ///
    /// # Arguments
    ///
    /// * `resource` - The resource to fetch
    /// * `context` - Layered values for the resource's first-page placeholders
    ///
    /// # Returns
    ///
    /// * `Ok(Request)` - A request whose query has every placeholder bound
    /// * `Err(ContractViolation)` - A placeholder had no context value
    pub fn first_page(
        resource: &'static Resource,
        context: &Context,
    ) -> Result<Self, ContractViolation> {
        let updates = resolve_placeholders(resource.first_page_diffs, context)?;
        Self::with_updates(resource, updates, 0)
    }

    /// Builds a request from explicit edits
    pub(crate) fn with_updates(
        resource: &'static Resource,
        selection_updates: Vec<SelectionUpdate>,
        page_number: u32,
    ) -> Result<Self, ContractViolation> {
        let query = apply_edits(&resource.base_query, &selection_updates)?;
        query.ensure_resolved()?;

        Ok(Self {
            resource,
            selection_updates,
            page_number,
            id: Uuid::new_v4(),
            query,
        })
    }

    /// Builds the continuation of this request starting at `cursor`
    pub(crate) fn continuation(&self, cursor: &str) -> Result<Self, ContractViolation> {
        let mut updates = self.selection_updates.clone();
        let mut kwargs = Params::new();
        kwargs.insert("after".to_string(), ParamValue::from(cursor));
        push_cursor_edit(
            &mut updates,
            SelectionUpdate::new(&self.resource.selection_path(), kwargs),
        );
        Self::with_updates(self.resource, updates, self.page_number + 1)
    }

    pub fn resource(&self) -> &'static Resource {
        self.resource
    }

    pub fn selection_updates(&self) -> &[SelectionUpdate] {
        &self.selection_updates
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The fully bound query this request sends
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Page size bound at this resource's pagination path
    pub fn page_size(&self) -> Option<i64> {
        self.param_at(&self.resource.selection_path(), "first")
            .and_then(ParamValue::as_int)
    }

    /// Cursor this page starts after, if it is not the first page
    pub fn page_cursor(&self) -> Option<&str> {
        self.param_at(&self.resource.selection_path(), "after")
            .and_then(ParamValue::as_str)
    }

    /// Page size bound at the parent resource's pagination path
    pub fn parent_page_size(&self) -> Option<i64> {
        let parent = self.resource.parent()?;
        self.param_at(&parent.selection_path(), "first")
            .and_then(ParamValue::as_int)
    }

    /// Cursor of the parent page this child page is scoped to
    pub fn parent_page_cursor(&self) -> Option<&str> {
        let parent = self.resource.parent()?;
        self.param_at(&parent.selection_path(), "after")
            .and_then(ParamValue::as_str)
    }

    /// Raw `after` value at this resource's pagination path (`Null` when unset)
    pub(crate) fn after_value(&self) -> ParamValue {
        self.param_at(&self.resource.selection_path(), "after")
            .cloned()
            .unwrap_or(ParamValue::Null)
    }

    /// Owner and name of the repository this request addresses, if any
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        let kwargs = get_kwargs_at(&self.query, &["repository"])?;
        let owner = kwargs.get(templates::OWNER)?.as_str()?;
        let name = kwargs.get(templates::NAME)?.as_str()?;
        Some((owner, name))
    }

    /// Stable identity used in log lines
    pub fn log_id(&self) -> String {
        let id = self.id.simple().to_string();
        format!("{}#{}-{}", self.resource.kind, self.page_number, &id[..8])
    }

    fn param_at(&self, path: &[String], key: &str) -> Option<&ParamValue> {
        get_kwargs_at(&self.query, path)?.get(key)
    }
}

/// Appends a cursor edit, first dropping every trailing edit it supersedes
///
/// Trailing edits targeting the same path with an `after` key are removed, so
/// the list never grows by more than one edit past the first-page diffs.
pub(crate) fn push_cursor_edit(updates: &mut Vec<SelectionUpdate>, edit: SelectionUpdate) {
    while updates
        .last()
        .map_or(false, |last| last.touches(&edit.path, "after"))
    {
        updates.pop();
    }
    updates.push(edit);
}
