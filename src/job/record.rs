use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::detect::Platform;
use crate::error::{ErrorCode, JobError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    DirectDownload,
    SearchDownload,
}

impl JobKind {
    /// Prefix used in generated job ids.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            JobKind::DirectDownload => "dl",
            JobKind::SearchDownload => "search",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Searching,
    Downloading,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Forward-only: staying put or moving later in the lifecycle. Failed is
    /// reachable from any live state; nothing leaves a terminal state.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        match next {
            JobState::Failed => true,
            JobState::Completed => *self != JobState::Pending && *self != JobState::Searching,
            _ => next >= *self,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Searching => "searching",
            JobState::Downloading => "downloading",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Status of one submitted job, as served to polling clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub kind: JobKind,
    #[serde(rename = "status")]
    pub state: JobState,
    #[serde(rename = "progress")]
    pub progress_percent: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(rename = "filename", skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
    #[serde(skip)]
    pub work_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    pub cookies_used: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(id: &str, kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            kind,
            state: JobState::Pending,
            progress_percent: 0,
            message: "Queued".to_string(),
            title: None,
            uploader: None,
            platform: None,
            artifact_path: None,
            work_dir: None,
            error_detail: None,
            error_code: None,
            cookies_used: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to Failed, keeping the taxonomy code next to the message.
    pub fn fail(&mut self, message: String, error: &JobError) {
        self.state = JobState::Failed;
        self.message = message;
        self.error_detail = Some(error.to_string());
        self.error_code = Some(error.code());
    }

    pub fn complete(&mut self, artifact: PathBuf) {
        self.state = JobState::Completed;
        self.progress_percent = 100;
        self.message = "Download completed successfully!".to_string();
        self.artifact_path = Some(artifact);
    }
}
