// crates/dinesafe-core/src/error.rs

use std::path::PathBuf;

use dinesafe_parser::FormatError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Network request to {url} failed: {message}")]
    Network {
        url: String,
        message: String,
        timeout: bool,
    },

    #[error("Upstream payload did not match the expected shape: {0}")]
    UpstreamFormat(String),

    #[error("Snapshot at {} is unreadable: {reason}", path.display())]
    SnapshotCorrupt { path: PathBuf, reason: String },

    #[error("No data available yet: {reason}")]
    SnapshotAbsent { reason: String },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub(crate) fn network(url: &str, err: reqwest::Error) -> Self {
        let timeout = err.is_timeout();
        let message = if timeout {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        PipelineError::Network {
            url: url.to_string(),
            message,
            timeout,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PipelineError::Network { timeout: true, .. })
    }

    /// Failures a caller may retry after backing off.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelineError::Network { .. })
    }
}

impl From<FormatError> for PipelineError {
    fn from(err: FormatError) -> Self {
        PipelineError::UpstreamFormat(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
