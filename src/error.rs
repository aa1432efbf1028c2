// Job failure taxonomy: what submission and job tasks report back to clients.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable machine-readable code attached to failed jobs and 400 responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    UnsupportedSource,
    EngineFailure,
    NoResults,
    ArtifactMissing,
    IoError,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Unsupported platform or invalid URL: {0}")]
    UnsupportedSource(String),

    #[error("{0}")]
    EngineFailure(String),

    #[error("No results found for '{0}'")]
    NoResults(String),

    #[error("Engine reported success but no media file was produced")]
    ArtifactMissing,

    #[error("Failed to prepare work directory: {0}")]
    WorkDir(#[from] std::io::Error),
}

impl JobError {
    pub fn code(&self) -> ErrorCode {
        match self {
            JobError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            JobError::UnsupportedSource(_) => ErrorCode::UnsupportedSource,
            JobError::EngineFailure(_) => ErrorCode::EngineFailure,
            JobError::NoResults(_) => ErrorCode::NoResults,
            JobError::ArtifactMissing => ErrorCode::ArtifactMissing,
            JobError::WorkDir(_) => ErrorCode::IoError,
        }
    }

    /// Engine errors keep the engine's own message, root cause first.
    pub fn engine(err: anyhow::Error) -> Self {
        JobError::EngineFailure(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_serialize_snake_case() {
        let code = JobError::NoResults("test track".into()).code();
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"no_results\"");
        assert_eq!(
            serde_json::to_string(&JobError::ArtifactMissing.code()).unwrap(),
            "\"artifact_missing\""
        );
    }

    #[test]
    fn test_engine_message_passthrough() {
        let err = JobError::engine(anyhow::anyhow!("ERROR: [youtube] abc: Video unavailable"));
        assert_eq!(err.to_string(), "ERROR: [youtube] abc: Video unavailable");
        assert_eq!(err.code(), ErrorCode::EngineFailure);
    }
}
