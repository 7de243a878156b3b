//! Real subprocess executor

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{DispatchError, Result};
use crate::exec::{CommandExecutor, CommandOutput};

/// Executor that spawns real subprocesses.
///
/// Under the test harness this executor refuses to run GitHub CLI
/// mutation subcommands and aborts the offending test instead, so a
/// forgotten mock can never dispatch or cancel real runs.
#[derive(Debug, Default, Clone)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        #[cfg(test)]
        if program == "gh" && super::is_mutation_command(args) {
            panic!(
                "refusing to run mutation command under test: gh {}",
                args.join(" ")
            );
        }

        tracing::debug!(program, ?args, "spawning subprocess");

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| DispatchError::CommandFailed {
                program: program.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
                code: None,
                stderr: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(DispatchError::CommandFailed {
                program: program.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
                code: output.status.code(),
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout() {
        let exec = ShellExecutor::new();
        let out = exec.execute("echo", &["hello"]).await.unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let exec = ShellExecutor::new();
        let err = exec.execute("false", &[]).await.unwrap_err();
        match err {
            DispatchError::CommandFailed { code, .. } => assert_eq!(code, Some(1)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    #[should_panic(expected = "refusing to run mutation command")]
    async fn test_mutation_gate_aborts_under_test() {
        let exec = ShellExecutor::new();
        let _ = exec.execute("gh", &["workflow", "run", "ci.yml"]).await;
    }
}
