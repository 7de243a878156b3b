//! Workflow run, job, and step types as returned by the GitHub API
//!
//! Deserialized from the JSON the `gh api` subcommand prints. The
//! `#[serde(other)]` fallbacks keep us safe against statuses GitHub
//! may add in the future.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a workflow run, job, or step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Queued,
    InProgress,
    Completed,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Returns true if the run is still active (not completed)
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Conclusion of a completed run, job, or step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
    Cancelled,
    Skipped,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for Conclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Skipped => write!(f, "skipped"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub status: RunStatus,
    /// Absent or null while the run is active; GitHub sends "" in
    /// some transitional states, which maps to `None` too.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub conclusion: Option<Conclusion>,
    #[serde(default)]
    pub html_url: String,
    pub updated_at: DateTime<Utc>,
}

/// A job within a workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub name: String,
    pub status: RunStatus,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub conclusion: Option<Conclusion>,
    /// Steps are always present in the API response; empty while the
    /// job is queued.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A step within a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub number: u32,
    pub status: RunStatus,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub conclusion: Option<Conclusion>,
}

/// Response shape of `GET .../actions/runs/{id}/jobs`
#[derive(Debug, Deserialize)]
pub(crate) struct JobsResponse {
    pub jobs: Vec<Job>,
}

/// Response shape of `GET .../actions/runs?per_page=1`
#[derive(Debug, Deserialize)]
pub(crate) struct RunsResponse {
    #[serde(default)]
    pub workflow_runs: Vec<Run>,
}

/// GitHub sends `"conclusion": ""` or `null` for unfinished runs.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<Conclusion>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(match raw.as_deref() {
        None | Some("") => None,
        Some(s) => Some(serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(serde::de::Error::custom)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_deserializes_with_null_conclusion() {
        let run: Run = serde_json::from_str(
            r#"{"id": 1, "name": "CI", "status": "in_progress", "conclusion": null,
                "html_url": "https://github.com/o/r/actions/runs/1",
                "updated_at": "2024-03-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(run.status, RunStatus::InProgress);
        assert!(run.conclusion.is_none());
        assert!(run.status.is_active());
    }

    #[test]
    fn test_run_deserializes_with_empty_conclusion() {
        let run: Run = serde_json::from_str(
            r#"{"id": 1, "status": "queued", "conclusion": "",
                "updated_at": "2024-03-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert!(run.conclusion.is_none());
    }

    #[test]
    fn test_completed_run_with_conclusion() {
        let run: Run = serde_json::from_str(
            r#"{"id": 2, "name": "CI", "status": "completed", "conclusion": "success",
                "html_url": "", "updated_at": "2024-03-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.conclusion, Some(Conclusion::Success));
        assert!(!run.status.is_active());
    }

    #[test]
    fn test_unknown_status_falls_back() {
        let run: Run = serde_json::from_str(
            r#"{"id": 3, "status": "waiting", "updated_at": "2024-03-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(run.status, RunStatus::Unknown);
        // Unknown statuses are treated as still active so the watcher
        // keeps polling them.
        assert!(run.status.is_active());
    }

    #[test]
    fn test_job_with_steps() {
        let job: Job = serde_json::from_str(
            r#"{"id": 10, "name": "build", "status": "completed", "conclusion": "failure",
                "steps": [
                    {"name": "checkout", "number": 1, "status": "completed", "conclusion": "success"},
                    {"name": "compile", "number": 2, "status": "completed", "conclusion": "failure"}
                ]}"#,
        )
        .unwrap();
        assert_eq!(job.steps.len(), 2);
        assert_eq!(job.steps[1].conclusion, Some(Conclusion::Failure));
    }
}
