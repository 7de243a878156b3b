//! Invocation history with frecency ranking
//!
//! Every dispatched workflow and finished chain is recorded; repeat
//! invocations with the same identity merge into one entry whose
//! `run_count` grows. Ranking multiplies frequency by a recency
//! weight, so "often and recently" beats "often, long ago".

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::StepResult;
use crate::error::{DispatchError, Result};

/// Directory name under the cache root
const APP_DIR: &str = "lazydispatch";
/// Directory name this tool's predecessor used
const LEGACY_DIR: &str = "gh-wfd";
const HISTORY_FILE: &str = "history.json";

/// What kind of invocation an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Workflow,
    Chain,
}

/// One remembered invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_name: Option<String>,
    pub branch: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    /// Step outcomes of the chain's last run, for resuming
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_results: Option<Vec<StepResult>>,
    pub run_count: u32,
    pub last_run_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Workflow filename or chain name, whichever applies.
    pub fn name(&self) -> &str {
        self.workflow
            .as_deref()
            .or(self.chain_name.as_deref())
            .unwrap_or("")
    }

    /// Merge identity: kind, name, branch, and the full input map
    /// (order-insensitive).
    fn same_identity(&self, other: &HistoryEntry) -> bool {
        self.kind == other.kind
            && self.workflow == other.workflow
            && self.chain_name == other.chain_name
            && self.branch == other.branch
            && self.inputs == other.inputs
    }

    /// Frequency × recency.
    pub fn score(&self, now: DateTime<Utc>) -> f64 {
        let hours = now
            .signed_duration_since(self.last_run_at)
            .num_minutes() as f64
            / 60.0;
        let recency = if hours < 1.0 {
            4.0
        } else if hours < 24.0 {
            2.0
        } else if hours < 168.0 {
            1.0
        } else {
            0.5
        };
        f64::from(self.run_count) * recency
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    entries: BTreeMap<String, Vec<HistoryEntry>>,
}

/// Persistent frecency-ranked history, keyed by repository
pub struct FrecencyStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, Vec<HistoryEntry>>>,
}

impl FrecencyStore {
    /// Create a store backed by `path` without reading it.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open the store at the platform cache path, migrating the
    /// legacy directory once if present, and load it.
    pub fn open_default() -> Result<Self> {
        let cache_root = cache_root()?;
        migrate_legacy_dir(&cache_root);
        let store = Self::new(cache_root.join(APP_DIR).join(HISTORY_FILE));
        store.load()?;
        Ok(store)
    }

    /// Read the history file; a missing file is an empty store.
    pub fn load(&self) -> Result<()> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let file: HistoryFile = serde_json::from_str(&content)?;
        *self.entries.write().unwrap() = file.entries;
        Ok(())
    }

    /// Persist the history as pretty JSON, atomically.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = {
            let entries = self.entries.read().unwrap();
            serde_json::to_string_pretty(&HistoryFile {
                entries: entries.clone(),
            })?
        };
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Record a workflow dispatch.
    pub fn record(
        &self,
        repo: &str,
        workflow: &str,
        branch: &str,
        inputs: BTreeMap<String, String>,
    ) {
        self.merge(
            repo,
            HistoryEntry {
                kind: HistoryKind::Workflow,
                workflow: Some(workflow.to_string()),
                chain_name: None,
                branch: branch.to_string(),
                inputs,
                step_results: None,
                run_count: 1,
                last_run_at: Utc::now(),
            },
        );
    }

    /// Record a finished chain, remembering its step outcomes.
    pub fn record_chain(
        &self,
        repo: &str,
        chain_name: &str,
        branch: &str,
        inputs: BTreeMap<String, String>,
        step_results: Vec<StepResult>,
    ) {
        self.merge(
            repo,
            HistoryEntry {
                kind: HistoryKind::Chain,
                workflow: None,
                chain_name: Some(chain_name.to_string()),
                branch: branch.to_string(),
                inputs,
                step_results: Some(step_results),
                run_count: 1,
                last_run_at: Utc::now(),
            },
        );
    }

    fn merge(&self, repo: &str, fresh: HistoryEntry) {
        let mut entries = self.entries.write().unwrap();
        let list = entries.entry(repo.to_string()).or_default();
        match list.iter_mut().find(|e| e.same_identity(&fresh)) {
            Some(existing) => {
                existing.run_count += 1;
                existing.last_run_at = fresh.last_run_at;
                if fresh.step_results.is_some() {
                    existing.step_results = fresh.step_results;
                }
            }
            None => list.push(fresh),
        }
    }

    /// The repo's entries ranked by descending score, optionally
    /// restricted to one workflow, truncated to `limit`.
    pub fn top_for_repo(
        &self,
        repo: &str,
        workflow_filter: Option<&str>,
        limit: usize,
    ) -> Vec<HistoryEntry> {
        let entries = self.entries.read().unwrap();
        let mut list: Vec<HistoryEntry> = entries
            .get(repo)
            .map(|l| l.to_vec())
            .unwrap_or_default()
            .into_iter()
            .filter(|e| workflow_filter.map_or(true, |w| e.workflow.as_deref() == Some(w)))
            .collect();

        let now = Utc::now();
        // Vec::sort_by is stable: equal scores keep insertion order.
        list.sort_by(|a, b| {
            b.score(now)
                .partial_cmp(&a.score(now))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        list.truncate(limit);
        list
    }

    /// The chain entry a resume starts from, if one was recorded.
    pub fn latest_chain_entry(&self, repo: &str, chain_name: &str) -> Option<HistoryEntry> {
        let entries = self.entries.read().unwrap();
        entries
            .get(repo)?
            .iter()
            .filter(|e| e.kind == HistoryKind::Chain && e.chain_name.as_deref() == Some(chain_name))
            .max_by_key(|e| e.last_run_at)
            .cloned()
    }
}

/// Cache root: `$XDG_CACHE_HOME`, else the platform cache directory.
fn cache_root() -> Result<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        if !xdg.is_empty() {
            return Ok(PathBuf::from(xdg));
        }
    }
    directories::BaseDirs::new()
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .ok_or_else(|| DispatchError::Config("could not determine cache directory".into()))
}

/// Copy the predecessor tool's cache directory once: only when the
/// old directory exists and the new one does not.
fn migrate_legacy_dir(cache_root: &Path) {
    let old = cache_root.join(LEGACY_DIR);
    let new = cache_root.join(APP_DIR);
    if !old.is_dir() || new.exists() {
        return;
    }
    if let Err(e) = copy_dir(&old, &new) {
        tracing::warn!(error = %e, "could not migrate legacy history directory");
    }
}

fn copy_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn inputs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_record_merges_on_identical_identity() {
        let store = FrecencyStore::new("/unused");
        store.record("o/r", "ci.yml", "main", inputs(&[("env", "prod")]));
        store.record("o/r", "ci.yml", "main", inputs(&[("env", "prod")]));
        store.record("o/r", "ci.yml", "main", inputs(&[("env", "prod")]));

        let top = store.top_for_repo("o/r", None, 10);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].run_count, 3);
        assert!(top[0].last_run_at <= Utc::now());
    }

    #[test]
    fn test_different_inputs_are_different_entries() {
        let store = FrecencyStore::new("/unused");
        store.record("o/r", "ci.yml", "main", inputs(&[("env", "prod")]));
        store.record("o/r", "ci.yml", "main", inputs(&[("env", "staging")]));
        store.record("o/r", "ci.yml", "dev", inputs(&[("env", "prod")]));

        assert_eq!(store.top_for_repo("o/r", None, 10).len(), 3);
    }

    #[test]
    fn test_chain_record_overwrites_step_results() {
        let store = FrecencyStore::new("/unused");
        store.record_chain("o/r", "release", "main", inputs(&[]), Vec::new());
        store.record_chain(
            "o/r",
            "release",
            "main",
            inputs(&[]),
            vec![StepResult::pending("ci.yml")],
        );

        let entry = store.latest_chain_entry("o/r", "release").unwrap();
        assert_eq!(entry.run_count, 2);
        assert_eq!(entry.step_results.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_frecency_ranking() {
        let store = FrecencyStore::new("/unused");
        let now = Utc::now();
        {
            let mut entries = store.entries.write().unwrap();
            let list = entries.entry("o/r".to_string()).or_default();
            for (workflow, run_count, age) in [
                ("lint.yml", 1, Duration::days(30)),
                ("test.yml", 5, Duration::hours(6)),
                ("build.yml", 10, Duration::minutes(30)),
            ] {
                list.push(HistoryEntry {
                    kind: HistoryKind::Workflow,
                    workflow: Some(workflow.to_string()),
                    chain_name: None,
                    branch: "main".into(),
                    inputs: BTreeMap::new(),
                    step_results: None,
                    run_count,
                    last_run_at: now - age,
                });
            }
        }

        let top = store.top_for_repo("o/r", None, 10);
        let names: Vec<_> = top.iter().map(|e| e.name()).collect();
        // 10*4=40, 5*2=10, 1*0.5=0.5
        assert_eq!(names, vec!["build.yml", "test.yml", "lint.yml"]);
    }

    #[test]
    fn test_ranking_is_stable_for_equal_scores() {
        let store = FrecencyStore::new("/unused");
        store.record("o/r", "a.yml", "main", inputs(&[]));
        store.record("o/r", "b.yml", "main", inputs(&[]));
        store.record("o/r", "c.yml", "main", inputs(&[]));

        let names: Vec<String> = store
            .top_for_repo("o/r", None, 10)
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["a.yml", "b.yml", "c.yml"]);
    }

    #[test]
    fn test_workflow_filter_and_limit() {
        let store = FrecencyStore::new("/unused");
        store.record("o/r", "a.yml", "main", inputs(&[]));
        store.record("o/r", "a.yml", "dev", inputs(&[]));
        store.record("o/r", "b.yml", "main", inputs(&[]));

        let filtered = store.top_for_repo("o/r", Some("a.yml"), 10);
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|e| e.workflow.as_deref() == Some("a.yml")));

        assert_eq!(store.top_for_repo("o/r", None, 2).len(), 2);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let store = FrecencyStore::new(&path);
        store.record("o/r", "ci.yml", "main", inputs(&[("env", "prod")]));
        store.record("o/r", "ci.yml", "main", inputs(&[("env", "prod")]));
        store.record_chain("o/r", "release", "main", inputs(&[]), Vec::new());
        store.save().unwrap();

        let reloaded = FrecencyStore::new(&path);
        reloaded.load().unwrap();
        let top = reloaded.top_for_repo("o/r", None, 10);
        assert_eq!(top.len(), 2);
        let ci = top.iter().find(|e| e.name() == "ci.yml").unwrap();
        assert_eq!(ci.run_count, 2);
        assert_eq!(ci.inputs["env"], "prod");
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let store = FrecencyStore::new("/nonexistent/history.json");
        store.load().unwrap();
        assert!(store.top_for_repo("o/r", None, 10).is_empty());
    }

    #[test]
    fn test_legacy_dir_migration() {
        let root = tempfile::tempdir().unwrap();
        let old = root.path().join(LEGACY_DIR);
        std::fs::create_dir_all(&old).unwrap();
        std::fs::write(old.join(HISTORY_FILE), r#"{"entries": {}}"#).unwrap();

        migrate_legacy_dir(root.path());
        assert!(root.path().join(APP_DIR).join(HISTORY_FILE).exists());

        // A second call must not clobber the migrated directory.
        std::fs::write(
            root.path().join(APP_DIR).join(HISTORY_FILE),
            r#"{"entries": {"o/r": []}}"#,
        )
        .unwrap();
        migrate_legacy_dir(root.path());
        let content =
            std::fs::read_to_string(root.path().join(APP_DIR).join(HISTORY_FILE)).unwrap();
        assert!(content.contains("o/r"));
    }
}
