//! Local git repository operations
//!
//! Thin subprocess wrapper around the `git` binary for the context
//! the dispatcher needs: where we are, which branch we are on, and
//! what branches exist. Every call carries a deadline so a hung git
//! (e.g. a slow credential helper behind `ls-remote`-style lookups)
//! cannot stall the UI.

use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{DispatchError, Result};

/// Deadline for branch enumeration
const LIST_DEADLINE: Duration = Duration::from_secs(5);
/// Deadline for current/default branch lookups
const BRANCH_DEADLINE: Duration = Duration::from_secs(2);

async fn git(args: &[&str], deadline: Duration) -> Result<String> {
    let invocation = async {
        Command::new("git")
            .args(args)
            .output()
            .await
            .map_err(|e| DispatchError::Git(e.to_string()))
    };

    let output = timeout(deadline, invocation)
        .await
        .map_err(|_| DispatchError::Git(format!("git {} timed out", args.join(" "))))??;

    if !output.status.success() {
        return Err(DispatchError::Git(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Whether the working directory is inside a git repository.
pub async fn is_git_repository() -> bool {
    git(&["rev-parse", "--git-dir"], BRANCH_DEADLINE).await.is_ok()
}

/// Root of the current repository.
pub async fn repo_root() -> Result<PathBuf> {
    let out = git(&["rev-parse", "--show-toplevel"], BRANCH_DEADLINE).await?;
    Ok(PathBuf::from(out.trim()))
}

/// The `origin` remote URL.
pub async fn origin_url() -> Result<String> {
    let out = git(&["remote", "get-url", "origin"], BRANCH_DEADLINE)
        .await
        .map_err(|_| DispatchError::NoGitHubRemote)?;
    Ok(out.trim().to_string())
}

/// Name of the checked-out branch; "HEAD" when detached.
pub async fn current_branch() -> Result<String> {
    let out = git(&["rev-parse", "--abbrev-ref", "HEAD"], BRANCH_DEADLINE).await?;
    Ok(out.trim().to_string())
}

/// The default branch according to `origin/HEAD`, falling back to
/// "main" when origin has not been queried yet.
pub async fn default_branch() -> Result<String> {
    match git(
        &["symbolic-ref", "refs/remotes/origin/HEAD", "--short"],
        BRANCH_DEADLINE,
    )
    .await
    {
        Ok(out) => Ok(out
            .trim()
            .strip_prefix("origin/")
            .unwrap_or(out.trim())
            .to_string()),
        Err(_) => Ok("main".to_string()),
    }
}

/// Local and remote branch names, deduped and sorted.
pub async fn list_branches() -> Result<Vec<String>> {
    let out = git(
        &[
            "for-each-ref",
            "--format=%(refname:short)",
            "refs/heads",
            "refs/remotes/origin",
        ],
        LIST_DEADLINE,
    )
    .await?;

    let mut names: Vec<String> = out
        .lines()
        .map(|l| l.trim().strip_prefix("origin/").unwrap_or(l.trim()).to_string())
        .filter(|n| !n.is_empty() && n != "HEAD")
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}
