//! In-process test double for the command executor
//!
//! Not gated behind `cfg(test)`: integration tests and downstream
//! consumers drive the whole engine against it.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{DispatchError, Result};
use crate::exec::{CommandExecutor, CommandOutput};

/// One recorded invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
}

impl RecordedCall {
    /// The full command line, space-joined, for quick assertions.
    pub fn line(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

#[derive(Debug, Clone)]
struct CannedResponse {
    stdout: String,
    stderr: String,
    error: Option<String>,
}

/// Executor parameterised by a map of command line to canned response.
///
/// Exact-match keys take precedence; a key registered with
/// [`MockExecutor::respond_prefix`] matches any invocation that starts
/// with it. Every call is recorded regardless of whether it matched.
#[derive(Debug, Default)]
pub struct MockExecutor {
    exact: Mutex<HashMap<String, CannedResponse>>,
    prefixes: Mutex<Vec<(String, CannedResponse)>>,
    history: Mutex<Vec<RecordedCall>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register stdout for an exact command line, e.g.
    /// `"gh api repos/o/r/actions/runs/1"`.
    pub fn respond(&self, command_line: &str, stdout: &str) {
        self.exact.lock().unwrap().insert(
            command_line.to_string(),
            CannedResponse {
                stdout: stdout.to_string(),
                stderr: String::new(),
                error: None,
            },
        );
    }

    /// Register a failure (non-zero exit with stderr) for an exact
    /// command line.
    pub fn fail(&self, command_line: &str, stderr: &str) {
        self.exact.lock().unwrap().insert(
            command_line.to_string(),
            CannedResponse {
                stdout: String::new(),
                stderr: stderr.to_string(),
                error: Some(stderr.to_string()),
            },
        );
    }

    /// Register stdout for any command line starting with the prefix.
    pub fn respond_prefix(&self, prefix: &str, stdout: &str) {
        self.prefixes.lock().unwrap().push((
            prefix.to_string(),
            CannedResponse {
                stdout: stdout.to_string(),
                stderr: String::new(),
                error: None,
            },
        ));
    }

    /// Register a failure for any command line starting with the prefix.
    pub fn fail_prefix(&self, prefix: &str, stderr: &str) {
        self.prefixes.lock().unwrap().push((
            prefix.to_string(),
            CannedResponse {
                stdout: String::new(),
                stderr: stderr.to_string(),
                error: Some(stderr.to_string()),
            },
        ));
    }

    /// All invocations seen so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.history.lock().unwrap().clone()
    }

    /// Invocations whose command line starts with the prefix.
    pub fn calls_matching(&self, prefix: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.line().starts_with(prefix))
            .collect()
    }

    fn lookup(&self, line: &str) -> Option<CannedResponse> {
        if let Some(resp) = self.exact.lock().unwrap().get(line) {
            return Some(resp.clone());
        }
        self.prefixes
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, resp)| resp.clone())
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let call = RecordedCall {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        };
        let line = call.line();
        self.history.lock().unwrap().push(call);

        match self.lookup(&line) {
            Some(resp) => match resp.error {
                Some(stderr) => Err(DispatchError::CommandFailed {
                    program: program.to_string(),
                    args: args.iter().map(|s| s.to_string()).collect(),
                    code: Some(1),
                    stderr,
                }),
                None => Ok(CommandOutput {
                    stdout: resp.stdout,
                    stderr: resp.stderr,
                }),
            },
            None => Err(DispatchError::CommandFailed {
                program: program.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
                code: Some(1),
                stderr: format!("MockExecutor: no response registered for '{line}'"),
            }),
        }
    }
}
