//! Resource catalog
//!
//! Static table of every fetchable resource kind. Each [`Resource`] pairs a
//! query template with the location of its pagination metadata and the edits
//! needed to produce its first page. Parent/child relationships live in a
//! separate edge list and are looked up on demand.
//!
//! The catalog is built once, on first use, and never changes afterwards.

pub mod templates;

use crate::query::{Query, QueryDiff, SelectionPath};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every resource kind the crawler knows how to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    RateLimit,
    Repo,
    RepoLangs,
    RepoDepManifests,
    RepoDepManifestDeps,
    RepoVulnAlerts,
    RepoVulnAlertVulns,
}

impl ResourceKind {
    /// All kinds, in catalog order
    pub const ALL: [ResourceKind; 7] = [
        Self::RateLimit,
        Self::Repo,
        Self::RepoLangs,
        Self::RepoDepManifests,
        Self::RepoDepManifestDeps,
        Self::RepoVulnAlerts,
        Self::RepoVulnAlertVulns,
    ];

    /// The kind's canonical upper-case name (e.g. `REPO_LANGS`)
    pub fn name(&self) -> &'static str {
        match self {
            Self::RateLimit => "RATE_LIMIT",
            Self::Repo => "REPO",
            Self::RepoLangs => "REPO_LANGS",
            Self::RepoDepManifests => "REPO_DEP_MANIFESTS",
            Self::RepoDepManifestDeps => "REPO_DEP_MANIFEST_DEPS",
            Self::RepoVulnAlerts => "REPO_VULN_ALERTS",
            Self::RepoVulnAlertVulns => "REPO_VULN_ALERT_VULNS",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown resource kind '{}'", s))
    }
}

/// One step of a page path through a parsed response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathElem {
    /// Object key
    Key(&'static str),

    /// Array index (e.g. the first edge of a parent connection)
    Index(usize),
}

/// A fetchable resource
#[derive(Debug)]
pub struct Resource {
    pub kind: ResourceKind,

    /// Query template with placeholder parameters
    pub base_query: Query,

    /// Where pagination metadata and results live in a response
    pub page_path: &'static [PathElem],

    /// Edits applied to `base_query` to build a first-page query
    pub first_page_diffs: &'static [QueryDiff],
}

impl Resource {
    /// The page path with array indices dropped, addressing the paginated
    /// field in the query
    pub fn selection_path(&self) -> SelectionPath {
        self.page_path
            .iter()
            .filter_map(|elem| match elem {
                PathElem::Key(key) => Some((*key).to_string()),
                PathElem::Index(_) => None,
            })
            .collect()
    }

    /// Declared child resources
    pub fn children(&self) -> impl Iterator<Item = &'static Resource> + '_ {
        EDGES
            .iter()
            .filter(move |(parent, _)| *parent == self.kind)
            .map(|(_, child)| resource(*child))
    }

    /// The parent resource, if this is a nested resource
    pub fn parent(&self) -> Option<&'static Resource> {
        EDGES
            .iter()
            .find(|(_, child)| *child == self.kind)
            .map(|(parent, _)| resource(*parent))
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    /// Name of the result list under the page path
    ///
    /// Root connections are read through `edges`; nested connections reached
    /// through a parent edge select `nodes` directly.
    pub fn results_key(&self) -> &'static str {
        if self.is_root() {
            "edges"
        } else {
            "nodes"
        }
    }
}

/// Parent -> child edges of the resource forest
pub const EDGES: &[(ResourceKind, ResourceKind)] = &[
    (ResourceKind::RepoDepManifests, ResourceKind::RepoDepManifestDeps),
    (ResourceKind::RepoVulnAlerts, ResourceKind::RepoVulnAlertVulns),
];

static CATALOG: Lazy<Vec<Resource>> = Lazy::new(|| {
    ResourceKind::ALL
        .iter()
        .map(|&kind| Resource {
            kind,
            base_query: templates::base_query(kind),
            page_path: templates::page_path(kind),
            first_page_diffs: templates::first_page_diffs(kind),
        })
        .collect()
});

/// Looks up the resource for a kind
pub fn resource(kind: ResourceKind) -> &'static Resource {
    &CATALOG[kind.index()]
}

/// Every resource in catalog order
pub fn all_resources() -> impl Iterator<Item = &'static Resource> {
    CATALOG.iter()
}

/// Resources with no parent
pub fn root_resources() -> impl Iterator<Item = &'static Resource> {
    all_resources().filter(|r| r.is_root())
}
