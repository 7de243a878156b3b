//! Chain execution
//!
//! Drives one chain run: for each step, interpolate its inputs,
//! dispatch the workflow, identify the triggered run, and wait on it
//! according to the step's wait policy. Failures are routed through
//! the step's `onFailure` policy. State lives behind a lock owned by
//! the executor; consumers receive value snapshots and channel
//! updates.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::chain::config::{ChainDefinition, ChainStep, OnFailure, WaitFor};
use crate::chain::template::{interpolate, unresolved_refs, InterpolationContext};
use crate::error::DispatchError;
use crate::github::{Conclusion, GhClient, RunStatus};
use crate::watch::RunWatcher;

/// Buffered updates before the sender starts dropping
const UPDATE_CHANNEL_CAPACITY: usize = 10;

/// Status of one chain step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
    Skipped,
}

/// Status of the chain as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChainStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// Outcome of one step, created at dispatch and owned by the executor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub workflow: String,
    /// Inputs after interpolation, as dispatched
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    pub run_id: Option<u64>,
    pub run_url: Option<String>,
    pub status: StepStatus,
    pub conclusion: Option<Conclusion>,
}

impl StepResult {
    pub fn pending(workflow: &str) -> Self {
        Self {
            workflow: workflow.to_string(),
            inputs: BTreeMap::new(),
            run_id: None,
            run_url: None,
            status: StepStatus::Pending,
            conclusion: None,
        }
    }
}

/// Snapshot of one chain execution
#[derive(Debug, Clone)]
pub struct ChainState {
    pub chain_name: String,
    pub branch: String,
    pub current_step: usize,
    pub step_results: BTreeMap<usize, StepResult>,
    pub step_statuses: Vec<StepStatus>,
    pub status: ChainStatus,
    pub error: Option<String>,
}

/// Published on every state change
#[derive(Debug, Clone)]
pub struct ChainUpdate {
    pub state: ChainState,
}

/// Sequential state machine executing one chain
pub struct ChainExecutor {
    runner: ChainRunner,
    token: CancellationToken,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    tx: std::sync::Mutex<Option<mpsc::Sender<ChainUpdate>>>,
}

/// Everything the background task needs, cloneable into the spawn.
#[derive(Clone)]
struct ChainRunner {
    client: Arc<GhClient>,
    watcher: Option<Arc<RunWatcher>>,
    definition: ChainDefinition,
    variables: BTreeMap<String, String>,
    branch: String,
    poll_interval: Duration,
    resume_from: usize,
    state: Arc<RwLock<ChainState>>,
    token: CancellationToken,
}

impl ChainExecutor {
    /// Create an executor for a fresh chain run.
    ///
    /// `variables` are the user's answers; variable defaults from the
    /// definition fill any the user left out.
    pub fn new(
        client: Arc<GhClient>,
        chain_name: impl Into<String>,
        definition: ChainDefinition,
        variables: BTreeMap<String, String>,
        branch: impl Into<String>,
        poll_interval: Duration,
    ) -> (Self, mpsc::Receiver<ChainUpdate>) {
        Self::build(client, chain_name, definition, variables, branch, poll_interval, Vec::new(), 0)
    }

    /// Create an executor that resumes a prior run at `resume_from`.
    ///
    /// Results for indices below `resume_from` are seeded from
    /// `previous` (by position) and are not re-executed.
    #[allow(clippy::too_many_arguments)]
    pub fn resume(
        client: Arc<GhClient>,
        chain_name: impl Into<String>,
        definition: ChainDefinition,
        variables: BTreeMap<String, String>,
        branch: impl Into<String>,
        poll_interval: Duration,
        previous: Vec<StepResult>,
        resume_from: usize,
    ) -> (Self, mpsc::Receiver<ChainUpdate>) {
        Self::build(
            client,
            chain_name,
            definition,
            variables,
            branch,
            poll_interval,
            previous,
            resume_from,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        client: Arc<GhClient>,
        chain_name: impl Into<String>,
        definition: ChainDefinition,
        variables: BTreeMap<String, String>,
        branch: impl Into<String>,
        poll_interval: Duration,
        previous: Vec<StepResult>,
        resume_from: usize,
    ) -> (Self, mpsc::Receiver<ChainUpdate>) {
        let branch = branch.into();
        let resume_from = resume_from.min(definition.steps.len());

        // Definition defaults fill variables the caller left unset.
        let mut effective_vars = variables;
        for var in &definition.variables {
            if let Some(default) = &var.default {
                effective_vars
                    .entry(var.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }

        let mut step_statuses = vec![StepStatus::Pending; definition.steps.len()];
        let mut step_results = BTreeMap::new();
        for (index, prior) in previous.into_iter().take(resume_from).enumerate() {
            step_statuses[index] = prior.status;
            step_results.insert(index, prior);
        }

        let state = ChainState {
            chain_name: chain_name.into(),
            branch: branch.clone(),
            current_step: resume_from,
            step_results,
            step_statuses,
            status: ChainStatus::Pending,
            error: None,
        };

        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let token = CancellationToken::new();
        let executor = Self {
            runner: ChainRunner {
                client,
                watcher: None,
                definition,
                variables: effective_vars,
                branch,
                poll_interval,
                resume_from,
                state: Arc::new(RwLock::new(state)),
                token: token.clone(),
            },
            token,
            task: Mutex::new(None),
            tx: std::sync::Mutex::new(Some(tx)),
        };
        (executor, rx)
    }

    /// Register every dispatched run with this watcher.
    pub fn with_watcher(mut self, watcher: Arc<RunWatcher>) -> Self {
        self.runner.watcher = Some(watcher);
        self
    }

    /// Spawn the execution task. A second call is a no-op.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() || self.token.is_cancelled() {
            return;
        }
        let Some(tx) = self.tx.lock().unwrap().take() else {
            return;
        };
        let runner = self.runner.clone();
        *task = Some(tokio::spawn(async move {
            runner.run(tx).await;
        }));
    }

    /// Value snapshot of the current chain state.
    pub async fn state(&self) -> ChainState {
        self.runner.state.read().await.clone()
    }

    /// Abort execution, including any active wait. Safe to call more
    /// than once.
    pub async fn stop(&self) {
        self.token.cancel();
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.tx.lock().unwrap().take();
    }

    /// Wait for the execution task to finish on its own.
    pub async fn join(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// How one step ended
enum StepVerdict {
    Completed {
        run_id: Option<u64>,
        run_url: Option<String>,
        conclusion: Option<Conclusion>,
    },
    Failed {
        error: Option<DispatchError>,
        run_id: Option<u64>,
        run_url: Option<String>,
        conclusion: Option<Conclusion>,
    },
    /// Stop was requested mid-step; leave state untouched
    Stopped,
}

impl ChainRunner {
    async fn run(self, tx: mpsc::Sender<ChainUpdate>) {
        {
            let mut state = self.state.write().await;
            state.status = ChainStatus::Running;
        }
        self.publish(&tx).await;

        let steps = self.definition.steps.clone();
        for (index, step) in steps.iter().enumerate().skip(self.resume_from) {
            if self.token.is_cancelled() {
                return;
            }

            self.begin_step(index, step).await;
            self.publish(&tx).await;

            let verdict = self.run_step(index, step, &tx).await;
            match verdict {
                StepVerdict::Stopped => return,
                StepVerdict::Completed {
                    run_id,
                    run_url,
                    conclusion,
                } => {
                    self.finish_step(index, StepStatus::Completed, run_id, run_url, conclusion)
                        .await;
                    self.publish(&tx).await;
                }
                StepVerdict::Failed {
                    error,
                    run_id,
                    run_url,
                    conclusion,
                } => {
                    let aborts = step.on_failure == OnFailure::Abort;
                    let recorded_status = match step.on_failure {
                        OnFailure::Skip => StepStatus::Skipped,
                        _ => StepStatus::Failed,
                    };
                    self.finish_step(index, recorded_status, run_id, run_url.clone(), conclusion)
                        .await;

                    if aborts {
                        let message = describe_step_failure(index, step, error, run_url, conclusion);
                        tracing::warn!(step = index, error = %message, "chain aborted");
                        let mut state = self.state.write().await;
                        state.status = ChainStatus::Failed;
                        state.error = Some(message);
                        drop(state);
                        self.publish(&tx).await;
                        return;
                    }

                    tracing::warn!(
                        step = index,
                        policy = ?step.on_failure,
                        "step failed; continuing per policy"
                    );
                    self.publish(&tx).await;
                }
            }
        }

        {
            let mut state = self.state.write().await;
            state.status = ChainStatus::Completed;
        }
        self.publish(&tx).await;
    }

    async fn begin_step(&self, index: usize, step: &ChainStep) {
        let mut state = self.state.write().await;
        state.current_step = index;
        state.step_statuses[index] = StepStatus::Running;
        let result = state
            .step_results
            .entry(index)
            .or_insert_with(|| StepResult::pending(&step.workflow));
        result.status = StepStatus::Running;
    }

    async fn finish_step(
        &self,
        index: usize,
        status: StepStatus,
        run_id: Option<u64>,
        run_url: Option<String>,
        conclusion: Option<Conclusion>,
    ) {
        let mut state = self.state.write().await;
        state.step_statuses[index] = status;
        if let Some(result) = state.step_results.get_mut(&index) {
            result.status = status;
            if run_id.is_some() {
                result.run_id = run_id;
            }
            if run_url.is_some() {
                result.run_url = run_url;
            }
            result.conclusion = conclusion;
        }
    }

    async fn run_step(
        &self,
        index: usize,
        step: &ChainStep,
        tx: &mpsc::Sender<ChainUpdate>,
    ) -> StepVerdict {
        // Interpolate inputs against variables and earlier results.
        let inputs = match self.interpolate_inputs(index, step).await {
            Ok(inputs) => inputs,
            Err(error) => {
                return StepVerdict::Failed {
                    error: Some(error),
                    run_id: None,
                    run_url: None,
                    conclusion: None,
                }
            }
        };

        {
            let mut state = self.state.write().await;
            if let Some(result) = state.step_results.get_mut(&index) {
                result.inputs = inputs.clone();
            }
        }

        // Dispatch, then identify the run it created.
        if let Err(e) = self
            .client
            .dispatch_workflow(&step.workflow, Some(&self.branch), &inputs)
            .await
        {
            return StepVerdict::Failed {
                error: Some(dispatch_error(&step.workflow, &self.branch, &e)),
                run_id: None,
                run_url: None,
                conclusion: None,
            };
        }

        let run = match self.client.get_latest_run(Some(&step.workflow)).await {
            Ok(Some(run)) => run,
            Ok(None) => {
                return StepVerdict::Failed {
                    error: Some(DispatchError::StepDispatch {
                        workflow: step.workflow.clone(),
                        branch: self.branch.clone(),
                        message: "dispatch succeeded but no run was found".into(),
                        suggestion: "GitHub may need a moment to register the run; retry the step"
                            .into(),
                    }),
                    run_id: None,
                    run_url: None,
                    conclusion: None,
                }
            }
            Err(e) => {
                return StepVerdict::Failed {
                    error: Some(dispatch_error(&step.workflow, &self.branch, &e)),
                    run_id: None,
                    run_url: None,
                    conclusion: None,
                }
            }
        };

        let run_id = run.id;
        let mut run_url = run.html_url.clone();

        {
            let mut state = self.state.write().await;
            if let Some(result) = state.step_results.get_mut(&index) {
                result.run_id = Some(run_id);
                result.run_url = Some(run_url.clone());
            }
        }

        if let Some(watcher) = &self.watcher {
            watcher.watch(run_id, &step.workflow).await;
        }

        if step.wait_for == WaitFor::None {
            return StepVerdict::Completed {
                run_id: Some(run_id),
                run_url: Some(run_url),
                conclusion: None,
            };
        }

        // Wait for the run to complete.
        {
            let mut state = self.state.write().await;
            state.step_statuses[index] = StepStatus::Waiting;
            if let Some(result) = state.step_results.get_mut(&index) {
                result.status = StepStatus::Waiting;
            }
        }
        self.publish(tx).await;

        let mut tick = interval(self.poll_interval);
        let conclusion = loop {
            tokio::select! {
                _ = self.token.cancelled() => return StepVerdict::Stopped,
                _ = tick.tick() => {}
            }

            match self.client.get_run(run_id).await {
                Ok(run) => {
                    if run.status == RunStatus::Completed {
                        if !run.html_url.is_empty() {
                            run_url = run.html_url;
                        }
                        break run.conclusion;
                    }
                }
                Err(e) => {
                    return StepVerdict::Failed {
                        error: Some(DispatchError::RunWait {
                            run_id,
                            message: e.to_string(),
                        }),
                        run_id: Some(run_id),
                        run_url: Some(run_url),
                        conclusion: None,
                    }
                }
            }
        };

        let succeeded = match step.wait_for {
            WaitFor::Success => conclusion == Some(Conclusion::Success),
            WaitFor::Completion => true,
            WaitFor::None => unreachable!(),
        };

        if succeeded {
            StepVerdict::Completed {
                run_id: Some(run_id),
                run_url: Some(run_url),
                conclusion,
            }
        } else {
            StepVerdict::Failed {
                error: None,
                run_id: Some(run_id),
                run_url: Some(run_url),
                conclusion,
            }
        }
    }

    async fn interpolate_inputs(
        &self,
        index: usize,
        step: &ChainStep,
    ) -> Result<BTreeMap<String, String>, DispatchError> {
        let state = self.state.read().await;
        let steps_ctx: Vec<StepResult> = (0..index)
            .map(|i| {
                state
                    .step_results
                    .get(&i)
                    .cloned()
                    .unwrap_or_else(|| StepResult::pending(""))
            })
            .collect();
        let previous = index.checked_sub(1).and_then(|i| steps_ctx.get(i));
        let ctx = InterpolationContext {
            vars: Some(&self.variables),
            steps: &steps_ctx,
            previous,
        };

        let mut inputs = BTreeMap::new();
        for (key, raw) in &step.inputs {
            let value = interpolate(raw, &ctx);
            if let Some(placeholder) = unresolved_refs(&value).into_iter().next() {
                return Err(DispatchError::Interpolation {
                    field: key.clone(),
                    value: raw.clone(),
                    placeholder,
                });
            }
            inputs.insert(key.clone(), value);
        }
        Ok(inputs)
    }

    async fn publish(&self, tx: &mpsc::Sender<ChainUpdate>) {
        let state = self.state.read().await.clone();
        match tx.try_send(ChainUpdate { state }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("chain update channel full; dropping update");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

fn dispatch_error(workflow: &str, branch: &str, cause: &DispatchError) -> DispatchError {
    let message = cause.to_string();
    let suggestion = if message.contains("could not find") || message.contains("404") {
        "Check that the workflow file exists on this branch and declares workflow_dispatch"
            .to_string()
    } else {
        "Check 'gh auth status' and your permission to run workflows in this repository"
            .to_string()
    };
    DispatchError::StepDispatch {
        workflow: workflow.to_string(),
        branch: branch.to_string(),
        message,
        suggestion,
    }
}

fn describe_step_failure(
    index: usize,
    step: &ChainStep,
    error: Option<DispatchError>,
    run_url: Option<String>,
    conclusion: Option<Conclusion>,
) -> String {
    match error {
        Some(source) => DispatchError::StepExecution {
            step: index,
            run_url,
            source: Box::new(source),
        }
        .to_string(),
        None => {
            let concluded = conclusion
                .map(|c| c.to_string())
                .unwrap_or_else(|| "no conclusion".to_string());
            format!("Step {index} ('{}') concluded {concluded}", step.workflow)
        }
    }
}
