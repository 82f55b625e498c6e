//! Log collection and analysis for kubeai
//!
//! Resolves pods and deployments/statefulsets to their pods, reads or follows
//! their logs, parses each line into a [`LogRecord`] and summarizes batches.

mod analyzer;
mod buffer;
mod collector;
mod error;
mod parser;
mod source;

pub use analyzer::{
    ISSUE_AUTH, ISSUE_ERROR_SPIKE, ISSUE_HIGH_ERROR_RATE, ISSUE_NETWORK, ISSUE_RESOURCE,
    ISSUE_RESTART_LOOP, analyze,
};
pub use buffer::{LevelCounts, LogBuffer};
pub use collector::{CollectedLogs, CollectorConfig, LogCollector, LogStream, SourceFailure};
pub use error::{BoxError, CollectError};
pub use parser::LogParser;
pub use source::{KubeLogSource, LogByteStream, LogSource, StreamOptions};

// Re-export types used in our public API
pub use kubeai_types::{CollectionRequest, LogLevel, LogRecord, LogSummary, ResourceKind, SourceRef};
