//! Incremental log streaming
//!
//! Re-fetches an active run's logs on a short interval and emits only
//! the lines that appeared since the previous poll, so the UI can
//! append instead of re-rendering the whole log.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::github::{Conclusion, GhClient, RunStatus};
use crate::logs::fetch::{LogEntry, LogFetcher};

/// Buffered updates before the sender starts dropping
const UPDATE_CHANNEL_CAPACITY: usize = 50;

/// Default stream poll cadence
pub const DEFAULT_STREAM_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// New lines of one step since the previous poll
#[derive(Debug, Clone)]
pub struct StepDelta {
    pub step_index: usize,
    pub step_name: String,
    /// Index of `entries[0]` within the step's full entry list
    pub start_index: usize,
    pub entries: Vec<LogEntry>,
}

/// One streaming update
#[derive(Debug, Clone)]
pub struct StreamUpdate {
    pub run_id: u64,
    pub status: RunStatus,
    /// Populated on the final update of a completed run
    pub conclusion: Option<Conclusion>,
    pub deltas: Vec<StepDelta>,
    /// True on the final update; the stream closes after it
    pub done: bool,
}

/// Streams one run's log growth until the run completes
pub struct LogStreamer {
    client: Arc<GhClient>,
    run_id: u64,
    workflow: String,
    poll_interval: Duration,
    tx: std::sync::Mutex<Option<mpsc::Sender<StreamUpdate>>>,
    token: CancellationToken,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl LogStreamer {
    /// Create a streamer and the receiving end of its update channel.
    /// Polling begins on [`LogStreamer::start`].
    pub fn new(
        client: Arc<GhClient>,
        run_id: u64,
        workflow: impl Into<String>,
        poll_interval: Duration,
    ) -> (Self, mpsc::Receiver<StreamUpdate>) {
        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let streamer = Self {
            client,
            run_id,
            workflow: workflow.into(),
            poll_interval,
            tx: std::sync::Mutex::new(Some(tx)),
            token: CancellationToken::new(),
            task: Mutex::new(None),
        };
        (streamer, rx)
    }

    /// Spawn the poll task. A second call is a no-op.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() || self.token.is_cancelled() {
            return;
        }
        let Some(tx) = self.tx.lock().unwrap().take() else {
            return;
        };

        let client = Arc::clone(&self.client);
        let run_id = self.run_id;
        let workflow = self.workflow.clone();
        let poll_interval = self.poll_interval;
        let token = self.token.clone();

        *task = Some(tokio::spawn(async move {
            stream_loop(client, run_id, workflow, poll_interval, token, tx).await;
        }));
    }

    /// Stop streaming and wait for the poll task. Safe to call more
    /// than once; the update channel is closed when the task exits.
    pub async fn stop(&self) {
        self.token.cancel();
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.tx.lock().unwrap().take();
    }
}

async fn stream_loop(
    client: Arc<GhClient>,
    run_id: u64,
    workflow: String,
    poll_interval: Duration,
    token: CancellationToken,
    tx: mpsc::Sender<StreamUpdate>,
) {
    let fetcher = LogFetcher::new(Arc::clone(&client));
    // stepIndex -> number of lines already emitted
    let mut seen: HashMap<usize, usize> = HashMap::new();
    let mut tick = interval(poll_interval);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => {}
        }

        let run = match client.get_run(run_id).await {
            Ok(run) => run,
            Err(e) => {
                tracing::warn!(run_id, error = %e, "stream status poll failed; retrying");
                continue;
            }
        };

        let steps = match fetcher.fetch_step_logs(run_id, &workflow).await {
            Ok(steps) => steps,
            Err(e) => {
                tracing::warn!(run_id, error = %e, "stream log fetch failed; retrying");
                continue;
            }
        };

        let mut deltas = Vec::new();
        for step in &steps {
            let already = seen.get(&step.step_index).copied().unwrap_or(0);
            if step.entries.len() > already {
                deltas.push(StepDelta {
                    step_index: step.step_index,
                    step_name: step.step_name.clone(),
                    start_index: already,
                    entries: step.entries[already..].to_vec(),
                });
                seen.insert(step.step_index, step.entries.len());
            }
        }

        let done = run.status == RunStatus::Completed;
        if !deltas.is_empty() || done {
            let update = StreamUpdate {
                run_id,
                status: run.status,
                conclusion: if done { run.conclusion } else { None },
                deltas,
                done,
            };
            match tx.try_send(update) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(run_id, "stream update channel full; dropping update");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            }
        }

        if done {
            break;
        }
    }
    tracing::debug!(run_id, "log streamer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MockExecutor;

    fn jobs_json(lines_per_step: &[usize]) -> String {
        let steps: Vec<String> = lines_per_step
            .iter()
            .enumerate()
            .map(|(i, _)| {
                format!(
                    r#"{{"name": "step{i}", "number": {}, "status": "in_progress", "conclusion": null}}"#,
                    i + 1
                )
            })
            .collect();
        format!(
            r#"{{"jobs": [{{"id": 100, "name": "job", "status": "in_progress", "steps": [{}]}}]}}"#,
            steps.join(",")
        )
    }

    fn log_text(lines_per_step: &[usize]) -> String {
        let mut text = String::new();
        for (step, lines) in lines_per_step.iter().enumerate() {
            text.push_str(&format!("##[group]step{step}\n"));
            // The group and endgroup markers count toward the entries.
            for line in 0..lines.saturating_sub(2) {
                text.push_str(&format!("step{step} line{line}\n"));
            }
            text.push_str("##[endgroup]\n");
        }
        text
    }

    fn run_json(status: &str, conclusion: &str) -> String {
        format!(
            r#"{{"id": 11, "status": "{status}", "conclusion": "{conclusion}",
                "updated_at": "2024-03-01T10:00:00Z"}}"#
        )
    }

    /// Drives the poll cycle of `stream_loop` by swapping mock
    /// responses between ticks.
    #[tokio::test]
    async fn test_incremental_deltas_and_final_update() {
        let mock = Arc::new(MockExecutor::new());
        mock.respond("gh api repos/o/r/actions/runs/11", &run_json("in_progress", ""));
        mock.respond("gh api repos/o/r/actions/runs/11/jobs", &jobs_json(&[5, 3]));
        mock.respond("gh run view 11 --log --job 100", &log_text(&[5, 3]));

        let client = Arc::new(GhClient::new(mock.clone(), "o/r").unwrap());
        let (streamer, mut rx) =
            LogStreamer::new(client, 11, "ci.yml", Duration::from_millis(30));
        streamer.start().await;

        // First poll: everything is new.
        let first = rx.recv().await.unwrap();
        assert_eq!(first.status, RunStatus::InProgress);
        assert!(!first.done);
        assert_eq!(first.deltas.len(), 2);
        assert_eq!(first.deltas[0].entries.len(), 5);
        assert_eq!(first.deltas[0].start_index, 0);
        assert_eq!(first.deltas[1].entries.len(), 3);

        // Second poll: step1 grew from 3 to 7 lines.
        mock.respond("gh api repos/o/r/actions/runs/11/jobs", &jobs_json(&[5, 7]));
        mock.respond("gh run view 11 --log --job 100", &log_text(&[5, 7]));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.deltas.len(), 1);
        assert_eq!(second.deltas[0].step_index, 1);
        assert_eq!(second.deltas[0].start_index, 3);
        assert_eq!(second.deltas[0].entries.len(), 4);

        // Third poll: a new step appears and the run completes.
        mock.respond("gh api repos/o/r/actions/runs/11", &run_json("completed", "success"));
        mock.respond(
            "gh api repos/o/r/actions/runs/11/jobs",
            &jobs_json(&[5, 7, 10]),
        );
        mock.respond("gh run view 11 --log --job 100", &log_text(&[5, 7, 10]));

        let third = rx.recv().await.unwrap();
        assert!(third.done);
        assert_eq!(third.conclusion, Some(Conclusion::Success));
        assert_eq!(third.deltas.len(), 1);
        assert_eq!(third.deltas[0].step_index, 2);
        assert_eq!(third.deltas[0].entries.len(), 10);

        // The stream closes after the final update.
        assert!(rx.recv().await.is_none());
        streamer.stop().await;
    }

    #[tokio::test]
    async fn test_no_update_when_nothing_changed() {
        let mock = Arc::new(MockExecutor::new());
        mock.respond("gh api repos/o/r/actions/runs/11", &run_json("in_progress", ""));
        mock.respond("gh api repos/o/r/actions/runs/11/jobs", &jobs_json(&[4]));
        mock.respond("gh run view 11 --log --job 100", &log_text(&[4]));

        let client = Arc::new(GhClient::new(mock, "o/r").unwrap());
        let (streamer, mut rx) =
            LogStreamer::new(client, 11, "ci.yml", Duration::from_millis(20));
        streamer.start().await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.deltas[0].entries.len(), 4);

        // Subsequent polls see identical logs: no updates arrive.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        streamer.stop().await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mock = Arc::new(MockExecutor::new());
        mock.fail_prefix("gh", "offline");
        let client = Arc::new(GhClient::new(mock, "o/r").unwrap());
        let (streamer, mut rx) =
            LogStreamer::new(client, 12, "ci.yml", Duration::from_millis(20));
        streamer.start().await;

        streamer.stop().await;
        streamer.stop().await;
        assert!(rx.recv().await.is_none());
    }
}
