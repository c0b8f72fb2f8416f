//! Query templates and first-page diffs for every resource kind
//!
//! Field selections follow GitHub's GraphQL v4 schema. Pagination fields
//! (`pageInfo { hasNextPage endCursor } totalCount`) sit directly under each
//! connection named by a resource's page path.

use super::{PathElem, ResourceKind};
use crate::query::{Field, Query, QueryDiff};

// Context keys supplied by the run-time configuration
pub const LANGS_PAGE_SIZE: &str = "github_repo_langs_page_size";
pub const DEP_MANIFESTS_PAGE_SIZE: &str = "github_repo_dep_manifests_page_size";
pub const DEP_MANIFEST_DEPS_PAGE_SIZE: &str = "github_repo_dep_manifest_deps_page_size";
pub const VULN_ALERTS_PAGE_SIZE: &str = "github_repo_vuln_alerts_page_size";
pub const VULN_ALERT_VULNS_PAGE_SIZE: &str = "github_repo_vuln_alert_vulns_page_size";

// Context keys supplied by the entity under crawl and by the parent request
pub const OWNER: &str = "owner";
pub const NAME: &str = "name";
pub const PARENT_AFTER: &str = "parent_after";

const REPOSITORY: &[&str] = &["repository"];
const LANGUAGES: &[&str] = &["repository", "languages"];
const MANIFESTS: &[&str] = &["repository", "dependencyGraphManifests"];
const MANIFEST_DEPS: &[&str] = &[
    "repository",
    "dependencyGraphManifests",
    "edges",
    "node",
    "dependencies",
];
const VULN_ALERTS: &[&str] = &["repository", "vulnerabilityAlerts"];
const VULN_ALERT_VULNS: &[&str] = &[
    "repository",
    "vulnerabilityAlerts",
    "edges",
    "node",
    "securityAdvisory",
    "vulnerabilities",
];

pub const SET_REPOSITORY_OWNER_AND_NAME: QueryDiff = QueryDiff {
    path: REPOSITORY,
    bindings: &[("owner", OWNER), ("name", NAME)],
};
pub const SET_LANGUAGES_FIRST: QueryDiff = QueryDiff {
    path: LANGUAGES,
    bindings: &[("first", LANGS_PAGE_SIZE)],
};
pub const SET_MANIFESTS_FIRST: QueryDiff = QueryDiff {
    path: MANIFESTS,
    bindings: &[("first", DEP_MANIFESTS_PAGE_SIZE)],
};
pub const SET_MANIFESTS_AFTER: QueryDiff = QueryDiff {
    path: MANIFESTS,
    bindings: &[("after", PARENT_AFTER)],
};
pub const SET_MANIFEST_DEPS_FIRST: QueryDiff = QueryDiff {
    path: MANIFEST_DEPS,
    bindings: &[("first", DEP_MANIFEST_DEPS_PAGE_SIZE)],
};
pub const SET_VULN_ALERTS_FIRST: QueryDiff = QueryDiff {
    path: VULN_ALERTS,
    bindings: &[("first", VULN_ALERTS_PAGE_SIZE)],
};
pub const SET_VULN_ALERTS_AFTER: QueryDiff = QueryDiff {
    path: VULN_ALERTS,
    bindings: &[("after", PARENT_AFTER)],
};
pub const SET_VULN_ALERT_VULNS_FIRST: QueryDiff = QueryDiff {
    path: VULN_ALERT_VULNS,
    bindings: &[("first", VULN_ALERT_VULNS_PAGE_SIZE)],
};

/// Where each resource's pagination block lives in a response
pub fn page_path(kind: ResourceKind) -> &'static [PathElem] {
    use PathElem::{Index, Key};
    match kind {
        ResourceKind::RateLimit => &[Key("rateLimit")],
        ResourceKind::Repo => &[Key("repository")],
        ResourceKind::RepoLangs => &[Key("repository"), Key("languages")],
        ResourceKind::RepoDepManifests => &[Key("repository"), Key("dependencyGraphManifests")],
        ResourceKind::RepoDepManifestDeps => &[
            Key("repository"),
            Key("dependencyGraphManifests"),
            Key("edges"),
            Index(0),
            Key("node"),
            Key("dependencies"),
        ],
        ResourceKind::RepoVulnAlerts => &[Key("repository"), Key("vulnerabilityAlerts")],
        ResourceKind::RepoVulnAlertVulns => &[
            Key("repository"),
            Key("vulnerabilityAlerts"),
            Key("edges"),
            Index(0),
            Key("node"),
            Key("securityAdvisory"),
            Key("vulnerabilities"),
        ],
    }
}

/// Edits that turn a template into a runnable first-page query
pub fn first_page_diffs(kind: ResourceKind) -> &'static [QueryDiff] {
    match kind {
        ResourceKind::RateLimit => &[],
        ResourceKind::Repo => &[SET_REPOSITORY_OWNER_AND_NAME],
        ResourceKind::RepoLangs => &[SET_REPOSITORY_OWNER_AND_NAME, SET_LANGUAGES_FIRST],
        ResourceKind::RepoDepManifests => &[SET_REPOSITORY_OWNER_AND_NAME, SET_MANIFESTS_FIRST],
        ResourceKind::RepoDepManifestDeps => &[
            SET_REPOSITORY_OWNER_AND_NAME,
            SET_MANIFESTS_FIRST,
            SET_MANIFESTS_AFTER,
            SET_MANIFEST_DEPS_FIRST,
        ],
        ResourceKind::RepoVulnAlerts => &[SET_REPOSITORY_OWNER_AND_NAME, SET_VULN_ALERTS_FIRST],
        ResourceKind::RepoVulnAlertVulns => &[
            SET_REPOSITORY_OWNER_AND_NAME,
            SET_VULN_ALERTS_FIRST,
            SET_VULN_ALERTS_AFTER,
            SET_VULN_ALERT_VULNS_FIRST,
        ],
    }
}

/// Base query template for a resource kind
pub fn base_query(kind: ResourceKind) -> Query {
    let field = match kind {
        ResourceKind::RateLimit => {
            Field::new("rateLimit").leaves(&["limit", "cost", "remaining", "resetAt"])
        }
        ResourceKind::Repo => repository().leaves(&[
            "createdAt",
            "updatedAt",
            "pushedAt",
            "description",
            "isArchived",
            "isDisabled",
            "diskUsage",
            "isPrivate",
            "isFork",
            "isLocked",
            "isMirror",
            "isTemplate",
        ])
        .child(Field::new("licenseInfo").leaves(&["key"]))
        .child(Field::new("primaryLanguage").leaves(&["name", "id"]))
        .child(Field::new("defaultBranchRef").leaves(&["name", "id", "prefix"])),
        ResourceKind::RepoLangs => repository().child(
            connection("languages", &["totalSize"])
                .placeholder("first")
                .child(edges(Field::new("node").leaves(&["id", "name"]))),
        ),
        ResourceKind::RepoDepManifests => repository().child(
            connection("dependencyGraphManifests", &[])
                .placeholder("first")
                .child(edges(manifest_node(Field::new("dependencies").param("first", 1u32)))),
        ),
        ResourceKind::RepoDepManifestDeps => repository().child(
            connection("dependencyGraphManifests", &[])
                .placeholder("first")
                .child(edges(
                    Field::new("node")
                        .leaves(&["id", "filename"])
                        .child(dependencies().placeholder("first")),
                )),
        ),
        ResourceKind::RepoVulnAlerts => repository().child(
            connection("vulnerabilityAlerts", &[])
                .placeholder("first")
                .child(edges(vuln_alert_node(
                    Field::new("vulnerabilities").param("first", 1u32),
                ))),
        ),
        ResourceKind::RepoVulnAlertVulns => repository().child(
            connection("vulnerabilityAlerts", &[])
                .placeholder("first")
                .child(edges(
                    Field::new("node").leaves(&["id"]).child(
                        Field::new("securityAdvisory")
                            .leaves(&["id", "ghsaId"])
                            .child(vulnerabilities().placeholder("first")),
                    ),
                )),
        ),
    };
    Query::new(vec![field])
}

fn repository() -> Field {
    Field::new("repository")
        .placeholder("owner")
        .placeholder("name")
        .leaves(&["databaseId", "id", "name"])
}

fn page_info() -> Field {
    Field::new("pageInfo").leaves(&["hasNextPage", "endCursor"])
}

fn connection(name: &str, extra: &[&str]) -> Field {
    Field::new(name)
        .child(page_info())
        .leaves(&["totalCount"])
        .leaves(extra)
}

fn edges(node: Field) -> Field {
    Field::new("edges").child(node)
}

fn dependencies() -> Field {
    connection("dependencies", &[]).child(
        Field::new("nodes").leaves(&[
            "packageName",
            "packageManager",
            "hasDependencies",
            "requirements",
        ]),
    )
}

fn manifest_node(mut deps_connection: Field) -> Field {
    deps_connection.children = dependencies().children;
    Field::new("node")
        .leaves(&[
            "id",
            "blobPath",
            "dependenciesCount",
            "exceedsMaxSize",
            "filename",
            "parseable",
        ])
        .child(deps_connection)
}

fn vulnerabilities() -> Field {
    connection("vulnerabilities", &[]).child(
        Field::new("nodes")
            .child(Field::new("package").leaves(&["name", "ecosystem"]))
            .leaves(&["severity", "updatedAt", "vulnerableVersionRange"]),
    )
}

fn vuln_alert_node(mut vulns_connection: Field) -> Field {
    vulns_connection.children = vulnerabilities().children;
    Field::new("node")
        .leaves(&["id", "dismissReason", "dismissedAt"])
        .child(Field::new("dismisser").leaves(&["id", "name"]))
        .child(
            Field::new("securityAdvisory")
                .leaves(&[
                    "id",
                    "ghsaId",
                    "summary",
                    "description",
                    "severity",
                    "publishedAt",
                    "updatedAt",
                    "withdrawnAt",
                ])
                .child(Field::new("identifiers").leaves(&["type", "value"]))
                .child(vulns_connection),
        )
        .leaves(&[
            "vulnerableManifestFilename",
            "vulnerableManifestPath",
            "vulnerableRequirements",
        ])
}
