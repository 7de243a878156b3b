//! Run watching
//!
//! Polls GitHub for the status of dispatched workflow runs and sends
//! update events to the UI. One background task serves arbitrarily
//! many watched runs; each tick polls only the runs that are still
//! active.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::github::{Conclusion, GhClient, Job, RunStatus};

/// Buffered updates before the sender starts dropping
const UPDATE_CHANNEL_CAPACITY: usize = 100;

/// Default poll cadence
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Tracked state of one watched run
#[derive(Debug, Clone)]
pub struct WatchedRun {
    pub run_id: u64,
    pub workflow: String,
    pub status: RunStatus,
    pub conclusion: Option<Conclusion>,
    pub jobs: Vec<Job>,
    pub html_url: String,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl WatchedRun {
    fn new(run_id: u64, workflow: String) -> Self {
        Self {
            run_id,
            workflow,
            status: RunStatus::Queued,
            conclusion: None,
            jobs: Vec::new(),
            html_url: String::new(),
            updated_at: Utc::now(),
            last_error: None,
        }
    }
}

/// One status update for a watched run
#[derive(Debug, Clone)]
pub struct RunUpdate {
    pub run_id: u64,
    /// Snapshot after a successful poll
    pub run: Option<WatchedRun>,
    /// Set when the poll failed; the run stays watched
    pub error: Option<String>,
}

/// Background poller for a set of workflow runs
pub struct RunWatcher {
    client: Arc<GhClient>,
    poll_interval: Duration,
    runs: Arc<RwLock<HashMap<u64, WatchedRun>>>,
    tx: std::sync::Mutex<Option<mpsc::Sender<RunUpdate>>>,
    token: CancellationToken,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RunWatcher {
    /// Create a watcher and the receiving end of its update channel.
    ///
    /// The poll task is started lazily by the first [`RunWatcher::watch`].
    pub fn new(client: Arc<GhClient>, poll_interval: Duration) -> (Self, mpsc::Receiver<RunUpdate>) {
        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let watcher = Self {
            client,
            poll_interval,
            runs: Arc::new(RwLock::new(HashMap::new())),
            tx: std::sync::Mutex::new(Some(tx)),
            token: CancellationToken::new(),
            task: Mutex::new(None),
        };
        (watcher, rx)
    }

    /// Register a run and poll it once before returning, so the first
    /// UI state is never blank.
    pub async fn watch(&self, run_id: u64, workflow: &str) {
        if self.token.is_cancelled() {
            return;
        }

        self.runs
            .write()
            .await
            .entry(run_id)
            .or_insert_with(|| WatchedRun::new(run_id, workflow.to_string()));

        self.ensure_started().await;

        let tx = self.tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            poll_one(&self.client, &self.runs, &tx, run_id).await;
        }
    }

    /// Remove a run from the watch table.
    pub async fn unwatch(&self, run_id: u64) {
        self.runs.write().await.remove(&run_id);
    }

    /// Drop every run that is no longer active.
    pub async fn clear_completed(&self) {
        self.runs
            .write()
            .await
            .retain(|_, run| run.status.is_active());
    }

    /// Number of runs still active.
    pub async fn active_count(&self) -> usize {
        self.runs
            .read()
            .await
            .values()
            .filter(|r| r.status.is_active())
            .count()
    }

    /// Number of runs in the table, active or not.
    pub async fn total_count(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Snapshot of one watched run.
    pub async fn get(&self, run_id: u64) -> Option<WatchedRun> {
        self.runs.read().await.get(&run_id).cloned()
    }

    /// Snapshot of the whole table, unordered.
    pub async fn snapshot(&self) -> Vec<WatchedRun> {
        self.runs.read().await.values().cloned().collect()
    }

    /// Stop the poller, wait for it, and close the update channel.
    ///
    /// Safe to call more than once.
    pub async fn stop(&self) {
        self.token.cancel();
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.tx.lock().unwrap().take();
    }

    async fn ensure_started(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }
        let tx = match self.tx.lock().unwrap().clone() {
            Some(tx) => tx,
            None => return,
        };
        let client = Arc::clone(&self.client);
        let runs = Arc::clone(&self.runs);
        let token = self.token.clone();
        let poll_interval = self.poll_interval;

        *task = Some(tokio::spawn(async move {
            let mut tick = interval(poll_interval);
            // The registration poll already covered "now".
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        poll_active(&client, &runs, &tx).await;
                    }
                }
            }
            tracing::debug!("run watcher poll task stopped");
        }));
    }
}

/// Poll every active run concurrently.
async fn poll_active(
    client: &Arc<GhClient>,
    runs: &Arc<RwLock<HashMap<u64, WatchedRun>>>,
    tx: &mpsc::Sender<RunUpdate>,
) {
    let active: Vec<u64> = runs
        .read()
        .await
        .values()
        .filter(|r| r.status.is_active())
        .map(|r| r.run_id)
        .collect();

    join_all(
        active
            .into_iter()
            .map(|run_id| poll_one(client, runs, tx, run_id)),
    )
    .await;
}

/// Poll one run, update the table, publish an update outside the lock.
async fn poll_one(
    client: &Arc<GhClient>,
    runs: &Arc<RwLock<HashMap<u64, WatchedRun>>>,
    tx: &mpsc::Sender<RunUpdate>,
    run_id: u64,
) {
    let fetched = async {
        let run = client.get_run(run_id).await?;
        let jobs = client.get_run_jobs(run_id).await?;
        crate::error::Result::Ok((run, jobs))
    }
    .await;

    let update = {
        let mut table = runs.write().await;
        // The run may have been unwatched while we were fetching.
        let Some(entry) = table.get_mut(&run_id) else {
            return;
        };
        match fetched {
            Ok((run, jobs)) => {
                entry.status = run.status;
                entry.conclusion = run.conclusion;
                entry.html_url = run.html_url;
                entry.updated_at = run.updated_at;
                if entry.workflow.is_empty() {
                    entry.workflow = run.name;
                }
                entry.jobs = jobs;
                entry.last_error = None;
                RunUpdate {
                    run_id,
                    run: Some(entry.clone()),
                    error: None,
                }
            }
            Err(e) => {
                let message = e.to_string();
                entry.last_error = Some(message.clone());
                RunUpdate {
                    run_id,
                    run: None,
                    error: Some(message),
                }
            }
        }
    };

    send_update(tx, update);
}

fn send_update(tx: &mpsc::Sender<RunUpdate>, update: RunUpdate) {
    match tx.try_send(update) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(update)) => {
            tracing::warn!(run_id = update.run_id, "watcher update channel full; dropping update");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}
