//! Error types for the model lifecycle pipeline

use std::path::PathBuf;

/// Failures surfaced by the training, inference and feedback operations.
///
/// Single-record problems (a malformed ledger line, an unparseable numeric
/// field, a half-written snapshot) are recovered where they happen and never
/// reach this type.
#[derive(Debug, thiserror::Error)]
pub enum MlError {
    #[error(
        "insufficient data: {observations} valid observations found in {instances} instances, at least {required} answered (non N/A) questions are required"
    )]
    InsufficientData {
        observations: usize,
        instances: usize,
        required: usize,
    },

    #[error("model not trained, train the model first")]
    NotTrained,

    #[error("invalid feedback: {reason}")]
    InvalidFeedback { reason: String },

    #[error("storage error at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("training task failed: {0}")]
    Task(String),
}

impl MlError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MlError::Storage {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MlError>;
