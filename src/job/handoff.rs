// One-shot artifact retrieval followed by deferred cleanup of the job.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tracing::{debug, info, warn};

use super::record::JobState;
use super::store::JobStore;

/// An opened artifact ready to stream.
#[derive(Debug)]
pub struct Artifact {
    pub file: File,
    pub filename: String,
    pub size: u64,
    pub content_type: &'static str,
}

#[derive(Debug)]
pub enum FetchOutcome {
    Ready(Artifact),
    /// The job exists but has not completed.
    NotReady,
    /// Unknown id, already fetched, or the file is gone.
    NotFound,
}

pub struct ArtifactHandoff {
    store: Arc<JobStore>,
    cleanup_delay: Duration,
}

impl ArtifactHandoff {
    pub fn new(store: Arc<JobStore>, cleanup_delay: Duration) -> Self {
        Self {
            store,
            cleanup_delay,
        }
    }

    /// Open the completed job's file and schedule removal of the job. Only the
    /// first successful call for an id returns `Ready`.
    pub async fn fetch(&self, id: &str) -> FetchOutcome {
        let record = match self.store.get(id) {
            Some(r) => r,
            None => return FetchOutcome::NotFound,
        };
        if self.store.is_claimed(id) {
            return FetchOutcome::NotFound;
        }
        let path = match (&record.state, &record.artifact_path) {
            (JobState::Completed, Some(path)) => path.clone(),
            _ => return FetchOutcome::NotReady,
        };

        let file = match File::open(&path).await {
            Ok(f) => f,
            Err(e) => {
                warn!("artifact for {} missing at {:?}: {}", id, path, e);
                return FetchOutcome::NotFound;
            }
        };
        let size = match file.metadata().await {
            Ok(m) => m.len(),
            Err(e) => {
                warn!("cannot stat artifact {:?}: {}", path, e);
                return FetchOutcome::NotFound;
            }
        };

        if self.store.claim_artifact(id).is_none() {
            debug!("artifact for {} claimed by a concurrent fetch", id);
            return FetchOutcome::NotFound;
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "download.bin".to_string());
        info!("handing off {} ({} bytes) for job {}", filename, size, id);
        self.schedule_cleanup(id);

        FetchOutcome::Ready(Artifact {
            file,
            content_type: content_type_for_filename(&filename),
            filename,
            size,
        })
    }

    /// Remove the record and its work dir once the transfer has had time to flush.
    /// The open file handle keeps streaming even after the directory is gone.
    pub fn schedule_cleanup(&self, id: &str) {
        let store = Arc::clone(&self.store);
        let delay = self.cleanup_delay;
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(removed) = store.remove(&id) {
                if let Err(e) = tokio::task::spawn_blocking(move || removed.dispose()).await {
                    warn!("cleanup for {} failed: {}", id, e);
                    return;
                }
                debug!("job {} cleaned up", id);
            }
        });
    }
}

pub fn content_type_for_filename(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "wav" => "audio/wav",
        "ogg" | "opus" => "audio/ogg",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}
