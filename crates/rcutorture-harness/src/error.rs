//! Harness-level errors.

use std::path::PathBuf;

use rcutorture_core::{ConfigError, TortureError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Torture(#[from] TortureError),
    #[error("failed writing '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("log sink: {0}")]
    Log(#[from] std::io::Error),
    #[error("serializing {what}: {source}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl HarnessError {
    /// Usage errors print the usage line; everything else is a runtime failure.
    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
