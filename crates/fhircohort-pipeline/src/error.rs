use std::path::PathBuf;

use fhircohort_client::ClientError;
use fhircohort_core::{CoreError, MetricKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed result file {path}: {source}")]
    MalformedResultFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed metadata document {path}: {source}")]
    MalformedMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Metric {key} does not accept a {given} value")]
    MetricType { key: MetricKey, given: &'static str },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Timestamp formatting error: {0}")]
    Time(#[from] time::error::Format),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
