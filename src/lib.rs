//! lazydispatch - an interactive terminal dispatcher for GitHub Actions
//!
//! This library drives `workflow_dispatch` workflows through the `gh`
//! CLI: it parses workflow and chain definitions, dispatches runs,
//! tracks them with a multiplexed poller, streams their logs
//! incrementally, and ranks past invocations by frecency.

pub mod chain;
pub mod cli;
pub mod core;
pub mod error;
pub mod exec;
pub mod github;
pub mod history;
pub mod logs;
pub mod ui;
pub mod watch;
pub mod workflow;

pub use error::{DispatchError, Result};
