//! GitHub CLI client
//!
//! Thin typed wrapper over the command executor. Every remote
//! interaction of the core goes through one of these operations; the
//! `gh` binary handles authentication.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{DispatchError, Result};
use crate::exec::CommandExecutor;
use crate::github::types::{Job, JobsResponse, Run, RunsResponse};

/// Typed wrapper over `gh` for one repository
pub struct GhClient {
    executor: Arc<dyn CommandExecutor>,
    /// `owner/repo`
    repo: String,
    gh_path: String,
}

impl std::fmt::Debug for GhClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GhClient")
            .field("repo", &self.repo)
            .field("gh_path", &self.gh_path)
            .finish_non_exhaustive()
    }
}

impl GhClient {
    /// Create a client for `repo` in `owner/repo` form.
    pub fn new(executor: Arc<dyn CommandExecutor>, repo: impl Into<String>) -> Result<Self> {
        let repo = repo.into();
        if !repo.contains('/') || repo.starts_with('/') || repo.ends_with('/') {
            return Err(DispatchError::InvalidRepoFormat(repo));
        }
        Ok(Self {
            executor,
            repo,
            gh_path: "gh".to_string(),
        })
    }

    /// Override the `gh` binary path (e.g. from the app config).
    pub fn with_gh_path(mut self, path: impl Into<String>) -> Self {
        self.gh_path = path.into();
        self
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Fetch one workflow run by ID.
    pub async fn get_run(&self, run_id: u64) -> Result<Run> {
        let route = format!("repos/{}/actions/runs/{}", self.repo, run_id);
        let out = self
            .gh(&["api", &route])
            .await
            .map_err(|e| api_error("get_run", Some(run_id), e))?;
        serde_json::from_str(&out).map_err(|e| api_error("get_run", Some(run_id), e.into()))
    }

    /// Fetch the jobs (and their steps) of a workflow run.
    pub async fn get_run_jobs(&self, run_id: u64) -> Result<Vec<Job>> {
        let route = format!("repos/{}/actions/runs/{}/jobs", self.repo, run_id);
        let out = self
            .gh(&["api", &route])
            .await
            .map_err(|e| api_error("get_run_jobs", Some(run_id), e))?;
        let resp: JobsResponse = serde_json::from_str(&out)
            .map_err(|e| api_error("get_run_jobs", Some(run_id), e.into()))?;
        Ok(resp.jobs)
    }

    /// Fetch the most recent run, optionally restricted to a workflow.
    ///
    /// Returns `None` when the repository has no matching runs yet.
    /// Callers use this right after a dispatch, and GitHub may not
    /// have registered the run on the first poll.
    pub async fn get_latest_run(&self, workflow: Option<&str>) -> Result<Option<Run>> {
        let mut route = format!("repos/{}/actions/runs?per_page=1", self.repo);
        if let Some(name) = workflow {
            route.push_str("&workflow=");
            route.push_str(name);
        }
        let out = self
            .gh(&["api", &route])
            .await
            .map_err(|e| api_error("get_latest_run", None, e))?;
        let resp: RunsResponse =
            serde_json::from_str(&out).map_err(|e| api_error("get_latest_run", None, e.into()))?;
        Ok(resp.workflow_runs.into_iter().next())
    }

    /// Dispatch a workflow (mutation).
    ///
    /// The API returns no run ID; use [`GhClient::get_latest_run`]
    /// afterwards to correlate the triggered run.
    pub async fn dispatch_workflow(
        &self,
        workflow: &str,
        branch: Option<&str>,
        inputs: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut args: Vec<String> = vec!["workflow".into(), "run".into(), workflow.into()];
        if let Some(branch) = branch {
            args.push("--ref".into());
            args.push(branch.into());
        }
        for (key, value) in inputs {
            args.push("-f".into());
            args.push(format!("{key}={value}"));
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.gh(&arg_refs)
            .await
            .map_err(|e| api_error("dispatch_workflow", None, e))?;
        Ok(())
    }

    /// Fetch the full log text of one job (plain text, not JSON).
    pub async fn view_job_log(&self, run_id: u64, job_id: u64) -> Result<String> {
        let run = run_id.to_string();
        let job = job_id.to_string();
        self.gh(&["run", "view", &run, "--log", "--job", &job])
            .await
            .map_err(|e| api_error("view_job_log", Some(run_id), e))
    }

    /// `gh --version`: is the CLI installed at all?
    pub async fn check_installed(&self) -> Result<String> {
        self.gh(&["--version"]).await
    }

    /// `gh auth status`: is the CLI authenticated?
    pub async fn check_auth(&self) -> Result<()> {
        self.gh(&["auth", "status"]).await.map(|_| ())
    }

    async fn gh(&self, args: &[&str]) -> Result<String> {
        let out = self.executor.execute(&self.gh_path, args).await?;
        Ok(out.stdout)
    }
}

fn api_error(operation: &str, run_id: Option<u64>, err: DispatchError) -> DispatchError {
    let message = match &err {
        DispatchError::CommandFailed { stderr, code, .. } => {
            if stderr.is_empty() {
                format!("gh exited with code {:?}", code)
            } else {
                stderr.trim().to_string()
            }
        }
        other => other.to_string(),
    };
    DispatchError::Api {
        operation: operation.to_string(),
        run_id,
        message,
    }
}
