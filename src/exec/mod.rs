//! Subprocess seam between the core and the outside world's CLIs
//!
//! Everything that leaves the process goes through [`CommandExecutor`]:
//! the real [`ShellExecutor`] spawns subprocesses, while
//! [`MockExecutor`] answers from a canned response map and records the
//! invocation history for assertions.

mod mock;
mod shell;

pub use mock::{MockExecutor, RecordedCall};
pub use shell::ShellExecutor;

use async_trait::async_trait;

use crate::error::Result;

/// Captured output of a finished subprocess
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Abstract runner for external commands
///
/// Implementations must be cheap to share behind an `Arc` across the
/// watcher, streamer, and chain executor tasks.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `program` with `args`, returning stdout/stderr on success.
    ///
    /// A non-zero exit is an error with the process stderr attached.
    async fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Subcommand prefixes of the GitHub CLI that mutate remote state.
///
/// `run watch` must stay out of this list even though it starts with
/// `run`; see [`is_mutation_command`].
const MUTATION_PREFIXES: &[&[&str]] = &[
    &["workflow", "run"],
    &["workflow", "enable"],
    &["workflow", "disable"],
    &["run", "cancel"],
    &["run", "rerun"],
    &["run", "delete"],
];

/// Whether a GitHub CLI invocation creates, cancels, deletes, or
/// reruns remote state.
///
/// Read-only invocations (`run view`, `run list`, `run watch`,
/// plain `api` reads, `--version`, `auth status`) return false. An
/// `api` call is only a mutation when it carries an explicit
/// non-GET method.
pub fn is_mutation_command(args: &[&str]) -> bool {
    if MUTATION_PREFIXES
        .iter()
        .any(|prefix| args.len() >= prefix.len() && &args[..prefix.len()] == *prefix)
    {
        return true;
    }

    // `gh api -X POST ...` and friends mutate; bare `gh api <route>` reads.
    if args.first() == Some(&"api") {
        let mut it = args.iter();
        while let Some(arg) = it.next() {
            if *arg == "-X" || *arg == "--method" {
                if let Some(method) = it.next() {
                    return !method.eq_ignore_ascii_case("GET");
                }
            }
        }
    }

    false
}
