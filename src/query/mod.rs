//! Query AST for paginated GraphQL selections
//!
//! Queries are plain trees of [`Field`]s. Each field carries its name, the
//! parameters bound to it (`first`, `after`, `owner`, ...) and its child
//! selections. Templates in the resource catalog leave required parameters
//! as [`ParamValue::Missing`] placeholders; the [`builder`] functions bind
//! them without ever changing the shape of the tree.

mod builder;
mod render;

pub use builder::{
    apply_edits, get_kwargs_at, resolve_placeholders, Context, QueryDiff, SelectionUpdate,
};

use crate::ContractViolation;
use std::collections::BTreeMap;

/// Path of field names from the query root to a field
pub type SelectionPath = Vec<String>;

/// Parameters bound at a single field, ordered by name for stable rendering
pub type Params = BTreeMap<String, ParamValue>;

/// A parameter value bound to a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Placeholder that must be bound before the query can be sent
    Missing,

    /// Explicit GraphQL `null` (e.g. the `after` cursor of a first page)
    Null,

    /// Integer argument such as a page size
    Int(i64),

    /// String argument such as a cursor, owner or name
    Str(String),
}

impl ParamValue {
    /// Returns true if this value is an unbound placeholder
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Returns the string value, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value, if any
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<Option<String>> for ParamValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Null, Self::Str)
    }
}

/// A single field in a selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub params: Params,
    pub children: Vec<Field>,
}

impl Field {
    /// Creates a field with no parameters or children
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: Params::new(),
            children: Vec::new(),
        }
    }

    /// Binds a parameter on this field
    pub fn param(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Declares a placeholder parameter that must be bound before sending
    pub fn placeholder(mut self, key: &str) -> Self {
        self.params.insert(key.to_string(), ParamValue::Missing);
        self
    }

    /// Appends scalar leaf fields
    pub fn leaves(mut self, names: &[&str]) -> Self {
        self.children.extend(names.iter().map(|name| Field::new(name)));
        self
    }

    /// Appends a nested field
    pub fn child(mut self, field: Field) -> Self {
        self.children.push(field);
        self
    }

    fn find<'a, S: AsRef<str>>(fields: &'a [Field], path: &[S]) -> Option<&'a Field> {
        let (head, rest) = path.split_first()?;
        let field = fields.iter().find(|f| f.name == head.as_ref())?;
        if rest.is_empty() {
            Some(field)
        } else {
            Self::find(&field.children, rest)
        }
    }

    fn find_mut<'a, S: AsRef<str>>(
        fields: &'a mut [Field],
        path: &[S],
    ) -> Option<&'a mut Field> {
        let (head, rest) = path.split_first()?;
        let field = fields.iter_mut().find(|f| f.name == head.as_ref())?;
        if rest.is_empty() {
            Some(field)
        } else {
            Self::find_mut(&mut field.children, rest)
        }
    }

    fn collect_missing(
        &self,
        prefix: &mut SelectionPath,
        out: &mut Vec<(SelectionPath, String)>,
    ) {
        prefix.push(self.name.clone());
        for (key, value) in &self.params {
            if value.is_missing() {
                out.push((prefix.clone(), key.clone()));
            }
        }
        for child in &self.children {
            child.collect_missing(prefix, out);
        }
        prefix.pop();
    }
}

/// A complete query: the root selection set
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    fields: Vec<Field>,
}

impl Query {
    /// Creates a query from its root fields
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Returns the root fields
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Looks up the field at `path`
    pub fn field_at<S: AsRef<str>>(&self, path: &[S]) -> Option<&Field> {
        Field::find(&self.fields, path)
    }

    pub(crate) fn field_at_mut<S: AsRef<str>>(&mut self, path: &[S]) -> Option<&mut Field> {
        Field::find_mut(&mut self.fields, path)
    }

    /// Lists every placeholder parameter still unbound, as (path, key) pairs
    pub fn unresolved(&self) -> Vec<(SelectionPath, String)> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        for field in &self.fields {
            field.collect_missing(&mut prefix, &mut out);
        }
        out
    }

    /// Fails if any placeholder is still unbound
    ///
    /// Called before every remote call; a query reaching the transport with a
    /// placeholder means the catalog or diff logic is broken.
    pub fn ensure_resolved(&self) -> Result<(), ContractViolation> {
        match self.unresolved().into_iter().next() {
            None => Ok(()),
            Some((path, key)) => Err(ContractViolation::UnresolvedPlaceholder {
                path: path.join("."),
                key,
            }),
        }
    }
}
