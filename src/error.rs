//! Custom error types for lazydispatch
//!
//! User-friendly error messages for all failure scenarios.

use thiserror::Error;

/// Main error type for the lazydispatch application
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Repository string is not in `owner/repo` form
    #[error("Invalid repository '{0}': expected the form owner/repo.\n\n  → Pass --repo owner/repo, or run inside a clone whose 'origin' points at GitHub.")]
    InvalidRepoFormat(String),

    /// Not running in a git repository
    #[error("This directory is not a git repository.\n\n  → Run 'git init' to create one, or navigate to an existing git project.")]
    NotGitRepository,

    /// No GitHub remote found
    #[error("No GitHub remote found in this repository.\n\n  → Make sure 'origin' points to a GitHub URL.\n  → Run 'git remote -v' to check your remotes.")]
    NoGitHubRemote,

    /// Invalid GitHub URL format
    #[error("Cannot parse GitHub URL: {0}\n\n  → Expected format: https://github.com/owner/repo or git@github.com:owner/repo")]
    InvalidGitHubUrl(String),

    /// The external CLI exited non-zero or returned invalid JSON
    #[error("GitHub API call '{operation}' failed{}: {message}\n\n  → Check your network connection and 'gh auth status'.", fmt_run_id(.run_id))]
    Api {
        /// Which client operation was running
        operation: String,
        /// Run the operation was about, if any
        run_id: Option<u64>,
        /// stderr of the CLI, or the decode failure
        message: String,
    },

    /// Subprocess could not be spawned or exited non-zero
    #[error("Command '{program}' failed{}: {stderr}", fmt_exit_code(.code))]
    CommandFailed {
        program: String,
        args: Vec<String>,
        code: Option<i32>,
        stderr: String,
    },

    /// Dispatch failed for a specific chain step
    #[error("Failed to dispatch '{workflow}' on '{branch}': {message}\n\n  → {suggestion}")]
    StepDispatch {
        workflow: String,
        branch: String,
        message: String,
        suggestion: String,
    },

    /// A template reference could not be resolved
    #[error("Cannot resolve '{placeholder}' in input '{field}' (value: {value})\n\n  → Check the chain's variables and earlier step inputs for this name.")]
    Interpolation {
        field: String,
        value: String,
        placeholder: String,
    },

    /// Polling a run while waiting on it surfaced an error
    #[error("Error while waiting on run {run_id}: {message}")]
    RunWait { run_id: u64, message: String },

    /// Wraps a step-level failure with its position in the chain
    #[error("Step {step} failed: {source}")]
    StepExecution {
        step: usize,
        run_url: Option<String>,
        #[source]
        source: Box<DispatchError>,
    },

    /// Pre-dispatch input validation failed
    #[error("Input '{input}' is invalid:\n{}", .messages.join("\n"))]
    ValidationBlocked {
        input: String,
        messages: Vec<String>,
    },

    /// An update channel was saturated; the update was dropped
    #[error("The '{0}' update channel is full; update dropped")]
    ChannelFull(&'static str),

    /// A validation comment carried a rule that cannot be parsed
    #[error("Invalid validation rule '{rule}' in {file}: {reason}")]
    InvalidValidationRule {
        file: String,
        rule: String,
        reason: String,
    },

    /// Chain config file declares an unsupported version
    #[error("Unsupported chain config version {0}.\n\n  → lazydispatch understands versions 1 and 2.")]
    UnsupportedConfigVersion(u64),

    /// Chain config or workflow YAML is malformed
    #[error("Cannot parse {file}: {source}")]
    Yaml {
        file: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Named chain does not exist in the config
    #[error("Chain '{0}' not found.\n\n  → Run 'lazydispatch chain list' to see the chains defined in .github/lazydispatch.yml.")]
    ChainNotFound(String),

    /// Workflow file does not declare workflow_dispatch
    #[error("Workflow '{0}' has no workflow_dispatch trigger and cannot be dispatched.\n\n  → Add an 'on: workflow_dispatch:' section to the workflow file.")]
    NotDispatchable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Git subprocess failed or timed out
    #[error("Git operation failed: {0}")]
    Git(String),

    /// IO error
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Failed to parse response: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML serialization/deserialization error
    #[error("Configuration file is invalid: {0}")]
    Toml(String),

    /// Generic error with custom message
    #[error("{0}")]
    Custom(String),
}

fn fmt_run_id(run_id: &Option<u64>) -> String {
    match run_id {
        Some(id) => format!(" for run {id}"),
        None => String::new(),
    }
}

fn fmt_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!(" (exit code {c})"),
        None => " (terminated by signal)".to_string(),
    }
}

impl From<toml::de::Error> for DispatchError {
    fn from(err: toml::de::Error) -> Self {
        DispatchError::Toml(err.to_string())
    }
}

impl From<toml::ser::Error> for DispatchError {
    fn from(err: toml::ser::Error) -> Self {
        DispatchError::Toml(err.to_string())
    }
}

impl DispatchError {
    /// Walk the error chain and return the first run URL found.
    ///
    /// The UI links the failing run when a chain stops; only
    /// `StepExecution` carries one.
    pub fn run_url(&self) -> Option<&str> {
        let mut err: &DispatchError = self;
        loop {
            if let DispatchError::StepExecution { run_url, source, .. } = err {
                if let Some(url) = run_url {
                    return Some(url);
                }
                err = source;
            } else {
                return None;
            }
        }
    }

    /// Walk the error chain and return the first actionable suggestion.
    pub fn suggestion(&self) -> Option<&str> {
        let mut err: &DispatchError = self;
        loop {
            match err {
                DispatchError::StepDispatch { suggestion, .. } => return Some(suggestion),
                DispatchError::StepExecution { source, .. } => err = source,
                _ => return None,
            }
        }
    }
}

/// Result type alias using DispatchError
pub type Result<T> = std::result::Result<T, DispatchError>;
