//! Hosted repository identification
//!
//! Extracts owner/name from the fork and upstream remote URLs so the
//! pull request can be addressed through the GitHub API.

use std::fmt;

use url::Url;

use crate::error::{Result, UploaderError};

/// A repository on GitHub, identified by owner and name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepo {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Repository name
    pub name: String,
}

impl RemoteRepo {
    /// Parse a remote URL into a repository reference
    pub fn from_url(url: &str) -> Result<Self> {
        let (owner, name) = parse_github_url(url)?;
        Ok(Self { owner, name })
    }

    /// Get the full repository name (owner/name)
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RemoteRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Parse a GitHub URL to extract owner and repository name
///
/// Supports both HTTPS and SSH URL formats:
/// - `https://github.com/owner/repo.git`
/// - `https://github.com/owner/repo`
/// - `git@github.com:owner/repo.git`
/// - `ssh://git@github.com/owner/repo.git`
pub fn parse_github_url(url: &str) -> Result<(String, String)> {
    if let Some(path) = url.strip_prefix("git@github.com:") {
        return parse_owner_repo_path(path.trim_end_matches(".git"), url);
    }

    if let Some(path) = url.strip_prefix("ssh://git@github.com/") {
        return parse_owner_repo_path(path.trim_end_matches(".git"), url);
    }

    if let Ok(parsed) = Url::parse(url) {
        if parsed.host_str() == Some("github.com") {
            let path = parsed
                .path()
                .trim_start_matches('/')
                .trim_end_matches('/')
                .trim_end_matches(".git");
            return parse_owner_repo_path(path, url);
        }
    }

    Err(invalid_url(url))
}

fn parse_owner_repo_path(path: &str, url: &str) -> Result<(String, String)> {
    let mut parts = path.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(invalid_url(url)),
    }
}

fn invalid_url(url: &str) -> UploaderError {
    UploaderError::Config(format!(
        "cannot parse GitHub URL '{}' (expected https://github.com/owner/repo or git@github.com:owner/repo)",
        url
    ))
}
