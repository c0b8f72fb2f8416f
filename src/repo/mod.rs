//! Repository identity
//!
//! A crawl targets one repository, named by owner and name. Input lines may
//! be `owner/name`, a GitHub URL, or a JSON object with a `repo_url` field.

use crate::query::Params;
use crate::resource::templates;
use crate::RepoError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::BufRead;
use std::str::FromStr;
use url::Url;

/// Owner/name pair of a GitHub repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

#[derive(Deserialize)]
struct InputLine {
    repo_url: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parses `owner/name` or a GitHub repository URL
    ///
    /// # Arguments
    ///
    /// * `input` - e.g. `mozilla/normandy` or `https://github.com/mozilla/normandy.git`
    ///
    /// # Returns
    ///
    /// * `Ok(RepoRef)` - The repository named by `input`
    /// * `Err(RepoError)` - `input` does not name a GitHub repository
    pub fn parse(input: &str) -> Result<Self, RepoError> {
        let input = input.trim();
        if input.contains("://") {
            return Self::from_url(input);
        }
        if let Some(rest) = input.strip_prefix("git@github.com:") {
            return Self::from_segments(input, rest.split('/'));
        }
        Self::from_segments(input, input.split('/'))
    }

    /// Parses one line of crawl input
    ///
    /// JSON lines must carry a `repo_url` field; anything else goes through
    /// [`RepoRef::parse`].
    pub fn from_input_line(line: &str) -> Result<Self, RepoError> {
        let line = line.trim();
        if line.starts_with('{') {
            let parsed: InputLine = serde_json::from_str(line)?;
            Self::parse(&parsed.repo_url)
        } else {
            Self::parse(line)
        }
    }

    /// Owner/name layer of the parameter context
    pub fn context_params(&self) -> Params {
        let mut params = Params::new();
        params.insert(templates::OWNER.to_string(), self.owner.as_str().into());
        params.insert(templates::NAME.to_string(), self.name.as_str().into());
        params
    }

    fn from_url(input: &str) -> Result<Self, RepoError> {
        let url = Url::parse(input).map_err(|e| RepoError::Parse(format!("{}: {}", input, e)))?;
        match url.host_str() {
            Some("github.com") | Some("www.github.com") => {}
            _ => return Err(RepoError::NotGithub(input.to_string())),
        }
        let segments = url
            .path_segments()
            .ok_or_else(|| RepoError::Parse(input.to_string()))?;
        Self::from_segments(input, segments)
    }

    fn from_segments<'a>(
        input: &str,
        segments: impl Iterator<Item = &'a str>,
    ) -> Result<Self, RepoError> {
        let mut parts = segments.filter(|s| !s.is_empty());
        let owner = parts.next();
        let name = parts.next().map(|n| n.trim_end_matches(".git"));
        match (owner, name) {
            (Some(owner), Some(name)) if is_valid_segment(owner) && is_valid_segment(name) => {
                Ok(Self::new(owner, name))
            }
            _ => Err(RepoError::Parse(input.to_string())),
        }
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoRef {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Reads repositories from crawl input, one per line
///
/// Blank lines and `#` comments are skipped. Lines that fail to parse are
/// returned as errors in place so the caller can log them and move on.
pub fn read_repos<R: BufRead>(reader: R) -> impl Iterator<Item = Result<RepoRef, RepoError>> {
    reader.lines().filter_map(|line| match line {
        Ok(line) => {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                None
            } else {
                Some(RepoRef::from_input_line(trimmed))
            }
        }
        Err(e) => Some(Err(RepoError::Parse(format!("failed to read input: {}", e)))),
    })
}
