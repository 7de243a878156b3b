//! lazydispatch - GitHub Actions workflow dispatcher
//!
//! Dispatch `workflow_dispatch` workflows, run chains of them with
//! wait and failure policies, and track runs from the terminal.
//!
//! Also available as the `lzd` command.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lazydispatch::cli::commands::{Cli, Commands};
use lazydispatch::cli::{chain, history, logs, workflow};
use lazydispatch::core::config::Config;
use lazydispatch::core::repository::RepositoryContext;
use lazydispatch::error::Result;
use lazydispatch::exec::ShellExecutor;
use lazydispatch::github::GhClient;

#[tokio::main]
async fn main() {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        if let Some(suggestion) = e.suggestion() {
            eprintln!("  → {}", suggestion);
        }
        if let Some(url) = e.run_url() {
            eprintln!("  → {}", url);
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("warning: could not load config, using defaults: {e}");
        Config::default()
    });

    match cli.command {
        // No subcommand: show what this repository offers.
        None => overview(cli.repo.as_deref(), &config).await,

        Some(Commands::Workflow(args)) => {
            workflow::handle_workflow(args.command, cli.repo.as_deref(), &config).await
        }
        Some(Commands::Chain(args)) => {
            chain::handle_chain(args.command, cli.repo.as_deref(), &config).await
        }
        Some(Commands::History(args)) => history::handle_history(args, cli.repo.as_deref()).await,
        Some(Commands::Logs(args)) => logs::handle_logs(args, cli.repo.as_deref(), &config).await,
    }
}

/// Default view: preflight the CLI, then list workflows and chains.
async fn overview(repo: Option<&str>, config: &Config) -> Result<()> {
    let ctx = RepositoryContext::detect_with_override(repo).await?;

    // Preflight warnings go to stderr and never abort.
    let client = GhClient::new(Arc::new(ShellExecutor::new()), ctx.full_name())?
        .with_gh_path(config.gh_path.clone());
    if let Err(e) = client.check_installed().await {
        eprintln!("warning: the GitHub CLI is not available: {e}");
    } else if let Err(e) = client.check_auth().await {
        eprintln!("warning: the GitHub CLI is not authenticated: {e}");
    }

    workflow::handle_workflow(
        lazydispatch::cli::commands::WorkflowCommand::List,
        repo,
        config,
    )
    .await?;
    println!();
    chain::handle_chain(lazydispatch::cli::commands::ChainCommand::List, repo, config).await
}
