//! Logs CLI command handler

use std::sync::Arc;

use crate::cli::commands::LogsArgs;
use crate::core::config::Config;
use crate::core::repository::RepositoryContext;
use crate::error::Result;
use crate::exec::ShellExecutor;
use crate::github::GhClient;
use crate::logs::{
    apply_filter, FilterConfig, LevelFilter, LogCache, LogFetcher, LogStreamer, RunLogs,
};

/// Show the logs of a chain run, consulting the TTL cache first.
pub async fn handle_logs(args: LogsArgs, repo: Option<&str>, config: &Config) -> Result<()> {
    let ctx = RepositoryContext::detect_with_override(repo).await?;

    if args.follow {
        return follow_logs(&args, &ctx, config).await;
    }

    let cache = LogCache::open(log_cache_dir()?)?;

    let logs = match cache.get(&args.chain, args.run_id) {
        Some(logs) => logs,
        None => {
            let client = Arc::new(
                GhClient::new(Arc::new(ShellExecutor::new()), ctx.full_name())?
                    .with_gh_path(config.gh_path.clone()),
            );
            let fetcher = LogFetcher::new(client);
            let steps = fetcher.fetch_step_logs(args.run_id, &args.workflow).await?;
            let logs = RunLogs {
                chain_name: args.chain.clone(),
                branch: ctx.current_branch.clone(),
                steps,
            };
            cache.put(&args.chain, args.run_id, logs.clone(), config.log_cache_ttl())?;
            logs
        }
    };

    let filter = FilterConfig {
        level: if args.errors_only {
            LevelFilter::Errors
        } else {
            LevelFilter::All
        },
        search_term: args.search.clone().unwrap_or_default(),
        case_sensitive: false,
        regex: false,
        step_index: -1,
    };
    let filtered = apply_filter(&logs, &filter)?;

    if filtered.is_empty() {
        println!("No matching log lines.");
        return Ok(());
    }

    let mut last_step = usize::MAX;
    for item in &filtered.entries {
        if item.step_index != last_step {
            println!("== step {} ({}) ==", item.step_index, item.entry.step_name);
            last_step = item.step_index;
        }
        println!("{}", item.entry.content);
    }
    Ok(())
}

/// Stream a live run's log growth until it completes.
async fn follow_logs(args: &LogsArgs, ctx: &RepositoryContext, config: &Config) -> Result<()> {
    let client = Arc::new(
        GhClient::new(Arc::new(ShellExecutor::new()), ctx.full_name())?
            .with_gh_path(config.gh_path.clone()),
    );
    let (streamer, mut rx) = LogStreamer::new(
        client,
        args.run_id,
        args.workflow.clone(),
        config.stream_poll_interval(),
    );
    streamer.start().await;

    while let Some(update) = rx.recv().await {
        for delta in &update.deltas {
            for entry in &delta.entries {
                println!("{}", entry.content);
            }
        }
        if update.done {
            let conclusion = update
                .conclusion
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("Run {} completed: {conclusion}", args.run_id);
            break;
        }
    }

    streamer.stop().await;
    Ok(())
}

/// Directory holding one JSON sidecar per cached run.
fn log_cache_dir() -> Result<std::path::PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        if !xdg.is_empty() {
            return Ok(std::path::PathBuf::from(xdg).join("lazydispatch").join("logs"));
        }
    }
    directories::BaseDirs::new()
        .map(|dirs| dirs.cache_dir().join("lazydispatch").join("logs"))
        .ok_or_else(|| {
            crate::error::DispatchError::Config("could not determine cache directory".into())
        })
}
