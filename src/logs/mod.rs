//! Log fetching, caching, streaming, and filtering

mod cache;
mod fetch;
mod filter;
mod stream;

pub use cache::{CacheStats, LogCache, DEFAULT_LOG_TTL};
pub use fetch::{LogEntry, LogFetcher, LogLevel, RunLogs, StepLogs};
pub use filter::{
    apply_filter, FilterConfig, FilteredEntry, FilteredResult, LevelFilter, MatchSpan,
};
pub use stream::{LogStreamer, StepDelta, StreamUpdate, DEFAULT_STREAM_POLL_INTERVAL};
