//! CLI command definitions and handlers

pub mod chain;
pub mod commands;
pub mod history;
pub mod logs;
pub mod workflow;
