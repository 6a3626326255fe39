use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::Stage;

/// Errors surfaced by pipeline stages
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or invalid configuration or credentials. Raised before any stage runs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A stage's upstream table is absent or empty
    #[error("cannot run `{stage}`: missing prerequisite {what} at {}; run `{producer}` first", path.display())]
    PrerequisiteMissing {
        stage: Stage,
        what: &'static str,
        producer: Stage,
        path: PathBuf,
    },

    /// Quota, auth or malformed-response failure from an upstream API
    #[error("{service} API error: {message}")]
    UpstreamApi {
        service: &'static str,
        message: String,
    },

    /// A single video could not be processed
    #[error("video {video_id}: {reason}")]
    PerItem { video_id: String, reason: String },

    /// An external command-line tool could not be started
    #[error("failed to launch `{tool}`: {source}")]
    Tool {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("table error at {}: {source}", path.display())]
    Table {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn per_item(video_id: &str, reason: impl Into<String>) -> Self {
        PipelineError::PerItem {
            video_id: video_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Process exit code for this failure class
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Configuration(_) => 2,
            PipelineError::PrerequisiteMissing { .. } => 3,
            PipelineError::UpstreamApi { .. } => 4,
            _ => 1,
        }
    }
}
