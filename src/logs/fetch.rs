//! Log fetching and parsing
//!
//! Turns the plain-text log dump of `gh run view --log` into
//! structured, step-segmented entries. GitHub delimits steps with
//! `##[group]` / `##[endgroup]` markers; groups are paired
//! positionally with the job's declared steps.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::github::{Conclusion, GhClient, Job, RunStatus};

/// Severity of one log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
    #[default]
    Info,
    Debug,
    Unknown,
}

/// One log line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Parsed from the leading RFC3339 token when present
    pub timestamp: Option<DateTime<Utc>>,
    /// Raw line, verbatim (ANSI escapes and markers included)
    pub content: String,
    pub level: LogLevel,
    pub step_name: String,
}

/// Structured logs of one step of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLogs {
    pub step_index: usize,
    pub workflow: String,
    pub run_id: u64,
    pub job_name: String,
    pub step_name: String,
    pub status: RunStatus,
    pub conclusion: Option<Conclusion>,
    pub entries: Vec<LogEntry>,
    pub fetched_at: DateTime<Utc>,
    /// Set when the log fetch for the owning job failed
    pub error: Option<String>,
}

/// All step logs of one tracked run
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunLogs {
    pub chain_name: String,
    pub branch: String,
    pub steps: Vec<StepLogs>,
}

static ERROR_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^error:").expect("invalid error prefix pattern"));
static WARNING_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^warning:").expect("invalid warning prefix pattern"));

/// Classify one log line body (timestamp already stripped).
fn classify(body: &str) -> LogLevel {
    if body.starts_with("##[error]") || ERROR_PREFIX.is_match(body) {
        LogLevel::Error
    } else if body.starts_with("##[warning]") || WARNING_PREFIX.is_match(body) {
        LogLevel::Warning
    } else if body.starts_with("##[debug]") {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

/// Split a leading RFC3339 timestamp token off a log line.
fn split_timestamp(line: &str) -> (Option<DateTime<Utc>>, &str) {
    if let Some((token, rest)) = line.split_once(' ') {
        if let Ok(ts) = token.parse::<DateTime<Utc>>() {
            return (Some(ts), rest);
        }
    }
    (None, line)
}

/// Fetches and parses the logs of a workflow run
pub struct LogFetcher {
    client: Arc<GhClient>,
}

impl LogFetcher {
    pub fn new(client: Arc<GhClient>) -> Self {
        Self { client }
    }

    /// Fetch the run's jobs, then every job's log text, and segment it
    /// into per-step entries.
    ///
    /// A CLI failure for one job yields one error-stamped [`StepLogs`]
    /// per declared step of that job; the remaining jobs are still
    /// processed.
    pub async fn fetch_step_logs(&self, run_id: u64, workflow: &str) -> Result<Vec<StepLogs>> {
        let jobs = self.client.get_run_jobs(run_id).await?;
        let mut steps = Vec::new();

        for job in &jobs {
            match self.client.view_job_log(run_id, job.id).await {
                Ok(text) => {
                    steps.extend(segment_job_log(run_id, workflow, job, &text));
                }
                Err(e) => {
                    tracing::warn!(job = job.name, error = %e, "log fetch failed for job");
                    let message = e.to_string();
                    for step in &job.steps {
                        steps.push(StepLogs {
                            step_index: 0,
                            workflow: workflow.to_string(),
                            run_id,
                            job_name: job.name.clone(),
                            step_name: step.name.clone(),
                            status: step.status,
                            conclusion: step.conclusion,
                            entries: Vec::new(),
                            fetched_at: Utc::now(),
                            error: Some(message.clone()),
                        });
                    }
                }
            }
        }

        for (index, step) in steps.iter_mut().enumerate() {
            step.step_index = index;
        }
        Ok(steps)
    }
}

/// Segment one job's raw log text by group markers and pair the
/// groups positionally with the job's declared steps.
fn segment_job_log(run_id: u64, workflow: &str, job: &Job, text: &str) -> Vec<StepLogs> {
    let mut groups: Vec<Vec<LogEntry>> = Vec::new();
    let mut current: Option<Vec<LogEntry>> = None;

    for line in text.lines() {
        let (timestamp, body) = split_timestamp(line);
        let entry = LogEntry {
            timestamp,
            content: line.to_string(),
            level: classify(body),
            step_name: String::new(),
        };

        if body.starts_with("##[group]") {
            // An unterminated group ends where the next one starts.
            if let Some(group) = current.take() {
                groups.push(group);
            }
            current = Some(vec![entry]);
        } else if body.starts_with("##[endgroup]") {
            if let Some(mut group) = current.take() {
                group.push(entry);
                groups.push(group);
            }
        } else if let Some(group) = current.as_mut() {
            group.push(entry);
        }
        // Lines outside any group belong to no step and are dropped.
    }
    if let Some(group) = current.take() {
        groups.push(group);
    }

    if groups.len() > job.steps.len() {
        tracing::warn!(
            job = job.name,
            groups = groups.len(),
            steps = job.steps.len(),
            "discarding surplus log groups without step metadata"
        );
    }

    let fetched_at = Utc::now();
    job.steps
        .iter()
        .zip(groups)
        .map(|(step, mut entries)| {
            for entry in &mut entries {
                entry.step_name = step.name.clone();
            }
            StepLogs {
                step_index: 0,
                workflow: workflow.to_string(),
                run_id,
                job_name: job.name.clone(),
                step_name: step.name.clone(),
                status: step.status,
                conclusion: step.conclusion,
                entries,
                fetched_at,
                error: None,
            }
        })
        .collect()
}
