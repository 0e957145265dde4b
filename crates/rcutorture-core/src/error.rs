//! Error types for torture runs and configuration parsing.

use thiserror::Error;

/// Fatal errors raised while setting up or tearing down a run.
///
/// Correctness violations observed by stress readers are data, not errors;
/// they are counted in the tallies and reported.
#[derive(Debug, Error)]
pub enum TortureError {
    #[error("failed to spawn {role} worker #{index}: {source}")]
    Spawn {
        role: &'static str,
        index: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("{role} worker #{index} panicked")]
    WorkerPanicked { role: &'static str, index: usize },
}

/// Rejected command-line or environment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown mode '{0}', expected perf|rperf|uperf|stress")]
    UnknownMode(String),
    #[error("unknown flavor '{0}', expected qsbr|rwlock")]
    UnknownFlavor(String),
    #[error("invalid {what} '{raw}'")]
    InvalidCount { what: &'static str, raw: String },
}
