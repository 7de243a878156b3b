//! On-disk TTL cache for fetched run logs
//!
//! Keeps recently viewed runs readable without refetching. Each entry
//! is mirrored to a JSON sidecar file so the cache survives restarts;
//! expired entries are reclaimed when the cache is loaded or cleared,
//! never on the read path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::logs::fetch::RunLogs;

/// Default time-to-live for cached logs
pub const DEFAULT_LOG_TTL: Duration = Duration::from_secs(30 * 60);

/// One cached run's logs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
    chain_name: String,
    run_id: u64,
    logs: RunLogs,
    cached_at: DateTime<Utc>,
    ttl_secs: u64,
}

impl CacheEntry {
    fn is_valid(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.cached_at);
        age.num_seconds() >= 0 && age.num_seconds() as u64 <= self.ttl_secs
    }
}

/// Cache occupancy counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    pub valid: usize,
    pub expired: usize,
}

/// TTL cache of [`RunLogs`] keyed by `(chain name, run id)`
pub struct LogCache {
    dir: PathBuf,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl LogCache {
    /// Create a cache rooted at `dir` without touching the disk.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create a cache and rebuild its table from the sidecar files,
    /// deleting expired files and skipping malformed ones.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let cache = Self::new(dir);
        cache.load()?;
        Ok(cache)
    }

    /// Rebuild the in-memory table from disk.
    pub fn load(&self) -> Result<()> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };

        let now = Utc::now();
        let mut table = self.entries.write().unwrap();
        table.clear();

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable cache file");
                    continue;
                }
            };
            let parsed: CacheEntry = match serde_json::from_str(&content) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping malformed cache file");
                    continue;
                }
            };
            if !parsed.is_valid(now) {
                let _ = std::fs::remove_file(&path);
                continue;
            }
            table.insert(cache_key(&parsed.chain_name, parsed.run_id), parsed);
        }
        Ok(())
    }

    /// Look up valid cached logs. Expired entries are a miss; they are
    /// reclaimed by [`LogCache::clear`] or the next load, not here.
    pub fn get(&self, chain_name: &str, run_id: u64) -> Option<RunLogs> {
        let table = self.entries.read().unwrap();
        let entry = table.get(&cache_key(chain_name, run_id))?;
        if entry.is_valid(Utc::now()) {
            Some(entry.logs.clone())
        } else {
            None
        }
    }

    /// Insert logs and write the sidecar file synchronously.
    pub fn put(
        &self,
        chain_name: &str,
        run_id: u64,
        logs: RunLogs,
        ttl: Duration,
    ) -> Result<()> {
        let key = cache_key(chain_name, run_id);
        let entry = CacheEntry {
            chain_name: chain_name.to_string(),
            run_id,
            logs,
            cached_at: Utc::now(),
            ttl_secs: ttl.as_secs(),
        };

        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(&entry)?;
        write_atomic(&self.file_path(&key), &json)?;

        self.entries.write().unwrap().insert(key, entry);
        Ok(())
    }

    /// Evict expired entries from memory and disk. Returns how many
    /// were reclaimed.
    pub fn clear(&self) -> Result<usize> {
        let now = Utc::now();
        let mut table = self.entries.write().unwrap();
        let expired: Vec<String> = table
            .iter()
            .filter(|(_, e)| !e.is_valid(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            table.remove(key);
            let _ = std::fs::remove_file(self.file_path(key));
        }
        Ok(expired.len())
    }

    /// Occupancy counters at this instant.
    pub fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let table = self.entries.read().unwrap();
        let valid = table.values().filter(|e| e.is_valid(now)).count();
        CacheStats {
            total: table.len(),
            valid,
            expired: table.len() - valid,
        }
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_file_name(key)))
    }
}

fn cache_key(chain_name: &str, run_id: u64) -> String {
    format!("{chain_name}:{run_id}")
}

/// Derive a filesystem-safe file stem from a cache key.
fn sanitize_file_name(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Write the full buffer to a temp file, then rename into place.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
