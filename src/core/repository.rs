//! Repository context detection
//!
//! This module handles detecting the GitHub repository from the
//! current git repository's remote URL and extracting owner/repo
//! information.

use std::path::PathBuf;

use url::Url;

use crate::core::git;
use crate::error::{DispatchError, Result};

/// Repository context containing owner and repo name
#[derive(Debug, Clone)]
pub struct RepositoryContext {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Repository name
    pub name: String,
    /// Root of the working copy
    pub root: PathBuf,
    /// Current branch name
    pub current_branch: String,
    /// Default branch (usually "main" or "master")
    pub default_branch: String,
}

impl RepositoryContext {
    /// Detect repository context from the current directory.
    pub async fn detect() -> Result<Self> {
        if !git::is_git_repository().await {
            return Err(DispatchError::NotGitRepository);
        }
        let root = git::repo_root().await?;
        let remote_url = git::origin_url().await?;
        let (owner, name) = parse_github_url(&remote_url)?;
        let current_branch = git::current_branch().await?;
        let default_branch = git::default_branch().await?;

        Ok(Self {
            owner,
            name,
            root,
            current_branch,
            default_branch,
        })
    }

    /// Detect, but override owner/name with an explicit `owner/repo`.
    pub async fn detect_with_override(repo: Option<&str>) -> Result<Self> {
        match repo {
            None => Self::detect().await,
            Some(repo) => {
                let (owner, name) = repo
                    .split_once('/')
                    .filter(|(o, n)| !o.is_empty() && !n.is_empty())
                    .map(|(o, n)| (o.to_string(), n.to_string()))
                    .ok_or_else(|| DispatchError::InvalidRepoFormat(repo.to_string()))?;

                // The working copy still supplies paths and branches
                // when available.
                let root = git::repo_root()
                    .await
                    .unwrap_or_else(|_| PathBuf::from("."));
                let current_branch = git::current_branch()
                    .await
                    .unwrap_or_else(|_| "main".to_string());
                let default_branch = git::default_branch()
                    .await
                    .unwrap_or_else(|_| "main".to_string());

                Ok(Self {
                    owner,
                    name,
                    root,
                    current_branch,
                    default_branch,
                })
            }
        }
    }

    /// Get the full repository name (owner/name)
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
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
    // SSH format: git@github.com:owner/repo.git
    if let Some(path) = url.strip_prefix("git@github.com:") {
        return parse_owner_repo_path(path.trim_end_matches(".git"));
    }

    // SSH URL format: ssh://git@github.com/owner/repo.git
    if let Some(path) = url.strip_prefix("ssh://git@github.com/") {
        return parse_owner_repo_path(path.trim_end_matches(".git"));
    }

    // HTTPS format
    if let Ok(parsed) = Url::parse(url) {
        if parsed.host_str() == Some("github.com") {
            let path = parsed
                .path()
                .trim_start_matches('/')
                .trim_end_matches(".git");
            return parse_owner_repo_path(path);
        }
    }

    Err(DispatchError::InvalidGitHubUrl(url.to_string()))
}

/// Parse owner/repo from a path string
fn parse_owner_repo_path(path: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() >= 2 {
        let owner = parts[0].to_string();
        let repo = parts[1].to_string();
        if !owner.is_empty() && !repo.is_empty() {
            return Ok((owner, repo));
        }
    }
    Err(DispatchError::InvalidGitHubUrl(path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_https_url() {
        let (owner, repo) = parse_github_url("https://github.com/owner/repo.git").unwrap();
        assert_eq!(owner, "owner");
        assert_eq!(repo, "repo");
    }

    #[test]
    fn test_parse_https_url_no_git() {
        let (owner, repo) = parse_github_url("https://github.com/owner/repo").unwrap();
        assert_eq!(owner, "owner");
        assert_eq!(repo, "repo");
    }

    #[test]
    fn test_parse_ssh_url() {
        let (owner, repo) = parse_github_url("git@github.com:owner/repo.git").unwrap();
        assert_eq!(owner, "owner");
        assert_eq!(repo, "repo");
    }

    #[test]
    fn test_parse_ssh_protocol_url() {
        let (owner, repo) = parse_github_url("ssh://git@github.com/owner/repo.git").unwrap();
        assert_eq!(owner, "owner");
        assert_eq!(repo, "repo");
    }

    #[test]
    fn test_invalid_url() {
        assert!(parse_github_url("not-a-url").is_err());
        assert!(parse_github_url("https://gitlab.com/owner/repo").is_err());
    }
}
