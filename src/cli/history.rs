//! History CLI command handler

use crate::cli::commands::HistoryArgs;
use crate::core::repository::RepositoryContext;
use crate::error::Result;
use crate::history::{FrecencyStore, HistoryKind};

/// Show past invocations for this repository, best-ranked first.
pub async fn handle_history(args: HistoryArgs, repo: Option<&str>) -> Result<()> {
    let ctx = RepositoryContext::detect_with_override(repo).await?;
    let store = FrecencyStore::open_default()?;

    let entries = store.top_for_repo(&ctx.full_name(), args.workflow.as_deref(), args.limit);
    if entries.is_empty() {
        println!("No history for {} yet.", ctx.full_name());
        return Ok(());
    }

    println!("History for {}:\n", ctx.full_name());
    println!("  {:<6}  {:<24}  {:<16}  {:>5}  {}", "KIND", "NAME", "BRANCH", "RUNS", "LAST RUN");
    println!("  {}", "-".repeat(76));
    for entry in entries {
        let kind = match entry.kind {
            HistoryKind::Workflow => "wf",
            HistoryKind::Chain => "chain",
        };
        println!(
            "  {:<6}  {:<24}  {:<16}  {:>5}  {}",
            kind,
            entry.name(),
            entry.branch,
            entry.run_count,
            entry.last_run_at.format("%Y-%m-%d %H:%M UTC")
        );
    }
    Ok(())
}
