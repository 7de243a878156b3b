//! Workflow CLI command handlers

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cli::commands::WorkflowCommand;
use crate::core::config::Config;
use crate::core::repository::RepositoryContext;
use crate::error::{DispatchError, Result};
use crate::exec::ShellExecutor;
use crate::github::{GhClient, RunStatus};
use crate::history::FrecencyStore;
use crate::watch::RunWatcher;
use crate::workflow::{discover_workflows, validate_value, WorkflowFile};

/// Handle workflow commands
pub async fn handle_workflow(
    command: WorkflowCommand,
    repo: Option<&str>,
    config: &Config,
) -> Result<()> {
    match command {
        WorkflowCommand::List => handle_list(repo).await,
        WorkflowCommand::Dispatch {
            workflow,
            branch,
            inputs,
            watch,
        } => handle_dispatch(repo, config, &workflow, branch, inputs, watch).await,
        WorkflowCommand::Watch { run_id } => handle_watch(repo, config, run_id).await,
    }
}

fn client_for(ctx: &RepositoryContext, config: &Config) -> Result<GhClient> {
    Ok(GhClient::new(Arc::new(ShellExecutor::new()), ctx.full_name())?
        .with_gh_path(config.gh_path.clone()))
}

async fn handle_list(repo: Option<&str>) -> Result<()> {
    let ctx = RepositoryContext::detect_with_override(repo).await?;
    let workflows = discover_workflows(&ctx.root)?;

    if workflows.is_empty() {
        println!("No workflows found under .github/workflows.");
        return Ok(());
    }

    println!("Workflows in {}:\n", ctx.full_name());
    println!("  {:<28}  {:<24}  {}", "FILE", "NAME", "DISPATCH");
    println!("  {}", "-".repeat(64));
    for wf in &workflows {
        let dispatch = match &wf.dispatch {
            Some(d) if d.inputs.is_empty() => "yes".to_string(),
            Some(d) => format!("yes ({} inputs)", d.inputs.len()),
            None => "-".to_string(),
        };
        println!(
            "  {:<28}  {:<24}  {}",
            truncate(&wf.filename, 28),
            truncate(&wf.name, 24),
            dispatch
        );
    }
    Ok(())
}

async fn handle_dispatch(
    repo: Option<&str>,
    config: &Config,
    workflow: &str,
    branch: Option<String>,
    inputs: Vec<(String, String)>,
    watch: bool,
) -> Result<()> {
    let ctx = RepositoryContext::detect_with_override(repo).await?;
    let branch = branch.unwrap_or_else(|| ctx.current_branch.clone());

    let schema = load_workflow(&ctx, workflow)?;
    let dispatch = schema
        .dispatch
        .as_ref()
        .ok_or_else(|| DispatchError::NotDispatchable(workflow.to_string()))?;

    // Defaults fill inputs the user left out, then every input is
    // validated before anything reaches the network.
    let mut values: BTreeMap<String, String> = inputs.into_iter().collect();
    for (name, input) in &dispatch.inputs {
        if let (false, Some(default)) = (values.contains_key(name), &input.default) {
            values.insert(name.clone(), default.clone());
        }
        let value = values.get(name).map(String::as_str).unwrap_or("");
        let failures = validate_value(value, &input.validation_rules);
        if !failures.is_empty() {
            return Err(DispatchError::ValidationBlocked {
                input: name.clone(),
                messages: failures,
            });
        }
    }

    let client = Arc::new(client_for(&ctx, config)?);
    client
        .dispatch_workflow(workflow, Some(&branch), &values)
        .await?;
    println!("Dispatched {workflow} on {branch}.");

    if let Ok(store) = FrecencyStore::open_default() {
        store.record(&ctx.full_name(), workflow, &branch, values);
        if let Err(e) = store.save() {
            eprintln!("warning: could not save history: {e}");
        }
    }

    let run = client.get_latest_run(Some(workflow)).await?;
    match run {
        Some(run) => {
            println!("Run {} -> {}", run.id, run.html_url);
            if watch {
                watch_run(client, config, run.id, workflow).await?;
            }
        }
        None => println!("The run has not appeared yet; try 'lazydispatch workflow watch' shortly."),
    }
    Ok(())
}

async fn handle_watch(repo: Option<&str>, config: &Config, run_id: u64) -> Result<()> {
    let ctx = RepositoryContext::detect_with_override(repo).await?;
    let client = Arc::new(client_for(&ctx, config)?);
    watch_run(client, config, run_id, "").await
}

/// Poll one run via the watcher, printing updates until it completes.
async fn watch_run(
    client: Arc<GhClient>,
    config: &Config,
    run_id: u64,
    workflow: &str,
) -> Result<()> {
    let (watcher, mut rx) = RunWatcher::new(client, config.poll_interval());
    watcher.watch(run_id, workflow).await;

    while let Some(update) = rx.recv().await {
        if let Some(error) = update.error {
            eprintln!("warning: poll failed: {error}");
            continue;
        }
        let Some(run) = update.run else { continue };
        match run.status {
            RunStatus::Completed => {
                let conclusion = run
                    .conclusion
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                println!("Run {run_id} completed: {conclusion}");
                break;
            }
            status => println!("Run {run_id}: {status}"),
        }
    }

    watcher.stop().await;
    Ok(())
}

fn load_workflow(ctx: &RepositoryContext, workflow: &str) -> Result<WorkflowFile> {
    let path = ctx
        .root
        .join(".github")
        .join("workflows")
        .join(workflow);
    let content = std::fs::read_to_string(&path).map_err(|_| {
        DispatchError::Config(format!(
            "workflow '{workflow}' not found under .github/workflows"
        ))
    })?;
    crate::workflow::parse_workflow(workflow, &content)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len - 1).collect();
        format!("{cut}…")
    }
}
