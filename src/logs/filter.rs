//! Log filtering
//!
//! Pure evaluation of a [`FilterConfig`] against [`RunLogs`]: the
//! source logs are untouched, and every matched entry carries the
//! spans that matched so the UI can highlight them.

use regex::{escape, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};
use crate::logs::fetch::{LogEntry, LogLevel, RunLogs};

/// Which severity levels pass the filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LevelFilter {
    #[default]
    All,
    Errors,
    Warnings,
    Custom,
}

/// A log filter as configured in the UI
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub level: LevelFilter,
    pub search_term: String,
    pub case_sensitive: bool,
    /// Treat `search_term` as a regular expression
    pub regex: bool,
    /// Restrict to one step; -1 means all steps
    pub step_index: i64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::All,
            search_term: String::new(),
            case_sensitive: false,
            regex: false,
            step_index: -1,
        }
    }
}

/// Byte span of one match within an entry's content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
}

/// One entry that passed the filter
#[derive(Debug, Clone)]
pub struct FilteredEntry {
    pub step_index: usize,
    pub entry_index: usize,
    pub entry: LogEntry,
    /// Search matches within the content; empty when no search term
    pub spans: Vec<MatchSpan>,
}

/// Result of applying a filter
#[derive(Debug, Clone, Default)]
pub struct FilteredResult {
    pub entries: Vec<FilteredEntry>,
}

impl FilteredResult {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Apply `config` to `logs`, preserving entry order.
///
/// Fails only when the search term is requested as a regex and does
/// not compile.
pub fn apply_filter(logs: &RunLogs, config: &FilterConfig) -> Result<FilteredResult> {
    let matcher = build_matcher(config)?;
    let mut result = FilteredResult::default();

    for step in &logs.steps {
        if config.step_index >= 0 && step.step_index as i64 != config.step_index {
            continue;
        }
        for (entry_index, entry) in step.entries.iter().enumerate() {
            if !level_passes(config.level, entry.level) {
                continue;
            }
            let spans = match &matcher {
                Some(re) => {
                    let spans: Vec<MatchSpan> = re
                        .find_iter(&entry.content)
                        .map(|m| MatchSpan {
                            start: m.start(),
                            end: m.end(),
                        })
                        .collect();
                    if spans.is_empty() {
                        continue;
                    }
                    spans
                }
                None => Vec::new(),
            };
            result.entries.push(FilteredEntry {
                step_index: step.step_index,
                entry_index,
                entry: entry.clone(),
                spans,
            });
        }
    }
    Ok(result)
}

fn level_passes(filter: LevelFilter, level: LogLevel) -> bool {
    match filter {
        LevelFilter::All | LevelFilter::Custom => true,
        LevelFilter::Errors => level == LogLevel::Error,
        LevelFilter::Warnings => matches!(level, LogLevel::Warning | LogLevel::Error),
    }
}

fn build_matcher(config: &FilterConfig) -> Result<Option<Regex>> {
    if config.search_term.is_empty() {
        return Ok(None);
    }
    let pattern = if config.regex {
        config.search_term.clone()
    } else {
        escape(&config.search_term)
    };
    let re = RegexBuilder::new(&pattern)
        .case_insensitive(!config.case_sensitive)
        .build()
        .map_err(|e| DispatchError::Config(format!("invalid log search pattern: {e}")))?;
    Ok(Some(re))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{Conclusion, RunStatus};
    use crate::logs::fetch::StepLogs;

    fn entry(content: &str, level: LogLevel) -> LogEntry {
        LogEntry {
            timestamp: None,
            content: content.to_string(),
            level,
            step_name: "step".to_string(),
        }
    }

    fn logs() -> RunLogs {
        RunLogs {
            chain_name: "release".into(),
            branch: "main".into(),
            steps: vec![
                StepLogs {
                    step_index: 0,
                    workflow: "ci.yml".into(),
                    run_id: 1,
                    job_name: "build".into(),
                    step_name: "compile".into(),
                    status: RunStatus::Completed,
                    conclusion: Some(Conclusion::Success),
                    entries: vec![
                        entry("Compiling crate", LogLevel::Info),
                        entry("Warning: unused variable", LogLevel::Warning),
                    ],
                    fetched_at: chrono::Utc::now(),
                    error: None,
                },
                StepLogs {
                    step_index: 1,
                    workflow: "ci.yml".into(),
                    run_id: 1,
                    job_name: "build".into(),
                    step_name: "test".into(),
                    status: RunStatus::Completed,
                    conclusion: Some(Conclusion::Failure),
                    entries: vec![
                        entry("running 12 tests", LogLevel::Info),
                        entry("Error: assertion failed", LogLevel::Error),
                    ],
                    fetched_at: chrono::Utc::now(),
                    error: None,
                },
            ],
        }
    }

    #[test]
    fn test_level_errors_only() {
        let result = apply_filter(
            &logs(),
            &FilterConfig {
                level: LevelFilter::Errors,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.entries[0].step_index, 1);
        assert_eq!(result.entries[0].entry_index, 1);
    }

    #[test]
    fn test_level_warnings_include_errors() {
        let result = apply_filter(
            &logs(),
            &FilterConfig {
                level: LevelFilter::Warnings,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_search_with_spans() {
        let result = apply_filter(
            &logs(),
            &FilterConfig {
                search_term: "tests".into(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(result.len(), 1);
        let m = &result.entries[0];
        assert_eq!(m.spans.len(), 1);
        assert_eq!(
            &m.entry.content[m.spans[0].start..m.spans[0].end],
            "tests"
        );
    }

    #[test]
    fn test_case_insensitive_by_default() {
        let result = apply_filter(
            &logs(),
            &FilterConfig {
                search_term: "ERROR".into(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(result.len(), 1);

        let strict = apply_filter(
            &logs(),
            &FilterConfig {
                search_term: "ERROR".into(),
                case_sensitive: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(strict.is_empty());
    }

    #[test]
    fn test_regex_search() {
        let result = apply_filter(
            &logs(),
            &FilterConfig {
                search_term: r"\d+ tests".into(),
                regex: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_invalid_regex_is_an_error() {
        let err = apply_filter(
            &logs(),
            &FilterConfig {
                search_term: "[unclosed".into(),
                regex: true,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }

    #[test]
    fn test_step_restriction() {
        let result = apply_filter(
            &logs(),
            &FilterConfig {
                step_index: 0,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.entries.iter().all(|e| e.step_index == 0));
    }

    #[test]
    fn test_filter_does_not_mutate_source() {
        let source = logs();
        let before = source.steps[0].entries.len();
        let _ = apply_filter(&source, &FilterConfig::default()).unwrap();
        assert_eq!(source.steps[0].entries.len(), before);
    }
}
