//! Chain CLI command handlers

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::chain::{
    load_chain_config, ChainExecutor, ChainStatus, StepStatus, VariableType,
};
use crate::cli::commands::ChainCommand;
use crate::core::config::Config;
use crate::core::repository::RepositoryContext;
use crate::error::{DispatchError, Result};
use crate::exec::ShellExecutor;
use crate::github::GhClient;
use crate::history::FrecencyStore;

/// Handle chain commands
pub async fn handle_chain(
    command: ChainCommand,
    repo: Option<&str>,
    config: &Config,
) -> Result<()> {
    match command {
        ChainCommand::List => handle_list(repo).await,
        ChainCommand::Run {
            chain,
            branch,
            variables,
            resume_from,
        } => handle_run(repo, config, &chain, branch, variables, resume_from).await,
    }
}

async fn handle_list(repo: Option<&str>) -> Result<()> {
    let ctx = RepositoryContext::detect_with_override(repo).await?;
    let chains = load_chain_config(&ctx.root)?;

    if chains.is_empty() {
        println!("No chains defined in .github/lazydispatch.yml.");
        return Ok(());
    }

    println!("Chains in {}:\n", ctx.full_name());
    for name in chains.chain_names() {
        let chain = chains.get(&name).expect("listed chain exists");
        let description = chain.description.as_deref().unwrap_or("");
        println!("  {:<20}  {} steps  {}", name, chain.steps.len(), description);
    }
    Ok(())
}

async fn handle_run(
    repo: Option<&str>,
    config: &Config,
    chain_name: &str,
    branch: Option<String>,
    variables: Vec<(String, String)>,
    resume_from: Option<usize>,
) -> Result<()> {
    let ctx = RepositoryContext::detect_with_override(repo).await?;
    let chains = load_chain_config(&ctx.root)?;
    let definition = chains
        .get(chain_name)
        .ok_or_else(|| DispatchError::ChainNotFound(chain_name.to_string()))?
        .clone();

    let branch = branch.unwrap_or_else(|| ctx.current_branch.clone());
    let variables: BTreeMap<String, String> = variables.into_iter().collect();
    check_required_variables(&definition.variables, &variables)?;

    let client = Arc::new(
        GhClient::new(Arc::new(ShellExecutor::new()), ctx.full_name())?
            .with_gh_path(config.gh_path.clone()),
    );

    let store = FrecencyStore::open_default().ok();

    let (executor, mut rx) = match resume_from {
        None => ChainExecutor::new(
            Arc::clone(&client),
            chain_name,
            definition,
            variables.clone(),
            branch.clone(),
            config.poll_interval(),
        ),
        Some(resume_from) => {
            let previous = store
                .as_ref()
                .and_then(|s| s.latest_chain_entry(&ctx.full_name(), chain_name))
                .and_then(|e| e.step_results)
                .ok_or_else(|| {
                    DispatchError::Config(format!(
                        "no recorded run of chain '{chain_name}' to resume from"
                    ))
                })?;
            ChainExecutor::resume(
                Arc::clone(&client),
                chain_name,
                definition,
                variables.clone(),
                branch.clone(),
                config.poll_interval(),
                previous,
                resume_from,
            )
        }
    };

    println!("Running chain '{chain_name}' on {branch}...");
    executor.start().await;

    while let Some(update) = rx.recv().await {
        let state = update.state;
        let step = state.current_step;
        if let Some(result) = state.step_results.get(&step) {
            let detail = match (result.status, result.run_id) {
                (StepStatus::Waiting, Some(id)) => format!("waiting on run {id}"),
                (status, Some(id)) => format!("{status:?} (run {id})").to_lowercase(),
                (status, None) => format!("{status:?}").to_lowercase(),
            };
            println!("  step {step} [{}]: {detail}", result.workflow);
        }
        if matches!(state.status, ChainStatus::Completed | ChainStatus::Failed) {
            break;
        }
    }

    let state = executor.state().await;

    if let Some(store) = store {
        let step_results = state.step_results.values().cloned().collect();
        store.record_chain(
            &ctx.full_name(),
            chain_name,
            &branch,
            variables,
            step_results,
        );
        if let Err(e) = store.save() {
            eprintln!("warning: could not save history: {e}");
        }
    }

    match state.status {
        ChainStatus::Failed => Err(DispatchError::Custom(state.error.unwrap_or_else(|| {
            format!("chain '{chain_name}' failed")
        }))),
        _ => {
            println!("Chain '{chain_name}' completed.");
            Ok(())
        }
    }
}

fn check_required_variables(
    declared: &[crate::chain::ChainVariable],
    provided: &BTreeMap<String, String>,
) -> Result<()> {
    for var in declared {
        let value = provided
            .get(&var.name)
            .cloned()
            .or_else(|| var.default.clone());
        let Some(value) = value else {
            if var.required {
                return Err(DispatchError::ValidationBlocked {
                    input: var.name.clone(),
                    messages: vec!["variable is required".to_string()],
                });
            }
            continue;
        };
        if var.variable_type == VariableType::Choice
            && !var.options.is_empty()
            && !var.options.contains(&value)
        {
            return Err(DispatchError::ValidationBlocked {
                input: var.name.clone(),
                messages: vec![format!(
                    "'{value}' is not one of: {}",
                    var.options.join(", ")
                )],
            });
        }
    }
    Ok(())
}
