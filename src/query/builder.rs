//! Parameter edits ("diffs") over query templates
//!
//! A [`QueryDiff`] names a path in a template and maps parameter keys to
//! symbolic context keys. [`resolve_placeholders`] looks those keys up in a
//! layered [`Context`] to produce concrete [`SelectionUpdate`]s, and
//! [`apply_edits`] merges the updates into a query.

use super::{ParamValue, Params, Query, SelectionPath};
use crate::ContractViolation;

/// A static edit declared by the resource catalog
///
/// `bindings` maps a parameter key at `path` to the name of the context entry
/// supplying its value, e.g. `("first", "github_repo_langs_page_size")`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryDiff {
    pub path: &'static [&'static str],
    pub bindings: &'static [(&'static str, &'static str)],
}

/// A concrete edit: parameters to merge into the field at `path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionUpdate {
    pub path: SelectionPath,
    pub kwargs: Params,
}

impl SelectionUpdate {
    pub fn new<S: AsRef<str>>(path: &[S], kwargs: Params) -> Self {
        Self {
            path: path.iter().map(|p| p.as_ref().to_string()).collect(),
            kwargs,
        }
    }

    /// Returns true if this edit targets `path` and binds `key`
    pub fn touches<S: AsRef<str>>(&self, path: &[S], key: &str) -> bool {
        self.kwargs.contains_key(key)
            && self.path.len() == path.len()
            && self.path.iter().zip(path).all(|(a, b)| a == b.as_ref())
    }
}

/// Layered key/value lookup used to resolve placeholders
///
/// Layers are searched in the order they were added; the first layer holding
/// a key wins.
#[derive(Debug, Clone, Default)]
pub struct Context {
    layers: Vec<Params>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a lower-priority layer
    pub fn layer(mut self, params: Params) -> Self {
        self.layers.push(params);
        self
    }

    /// Adds a layer that takes priority over every existing one
    pub fn overlay(mut self, params: Params) -> Self {
        self.layers.insert(0, params);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }
}

/// Returns the parameters bound at `path`, or `None` if the path does not
/// resolve to a field
pub fn get_kwargs_at<'a, S: AsRef<str>>(query: &'a Query, path: &[S]) -> Option<&'a Params> {
    query.field_at(path).map(|field| &field.params)
}

/// Applies each edit in order, overwriting parameters key by key
///
/// Edits only ever touch existing fields; an edit whose path does not exist
/// in the query is a catalog bug.
pub fn apply_edits(query: &Query, edits: &[SelectionUpdate]) -> Result<Query, ContractViolation> {
    let mut query = query.clone();
    for edit in edits {
        let field = query
            .field_at_mut(&edit.path)
            .ok_or_else(|| ContractViolation::PathNotFound {
                path: edit.path.join("."),
            })?;
        for (key, value) in &edit.kwargs {
            field.params.insert(key.clone(), value.clone());
        }
    }
    Ok(query)
}

/// Binds each diff's symbolic parameters to values from `context`
///
/// A missing context entry is never defaulted. A context entry that is itself
/// an unbound placeholder counts as missing.
pub fn resolve_placeholders(
    diffs: &[QueryDiff],
    context: &Context,
) -> Result<Vec<SelectionUpdate>, ContractViolation> {
    diffs
        .iter()
        .map(|diff| {
            let mut kwargs = Params::new();
            for (param, context_key) in diff.bindings {
                let value = context
                    .get(context_key)
                    .filter(|value| !value.is_missing())
                    .ok_or_else(|| ContractViolation::MissingContextKey {
                        key: (*context_key).to_string(),
                    })?;
                kwargs.insert((*param).to_string(), value.clone());
            }
            Ok(SelectionUpdate::new(diff.path, kwargs))
        })
        .collect()
}
