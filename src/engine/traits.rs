use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

use super::options::EngineRequest;
use super::progress::ProgressEvent;

/// Metadata for one resolved media entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    /// Canonical page URL; used to download exactly the entry a search resolved to.
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
}

/// Result of a metadata-only probe. A search that matched nothing has no entries.
#[derive(Debug, Clone, Default)]
pub struct ProbeResult {
    pub entries: Vec<MediaInfo>,
}

impl ProbeResult {
    pub fn single(info: MediaInfo) -> Self {
        Self {
            entries: vec![info],
        }
    }

    pub fn first(&self) -> Option<&MediaInfo> {
        self.entries.first()
    }
}

/// What a finished download reported about its output.
#[derive(Debug, Clone, Default)]
pub struct DownloadOutcome {
    /// Final path as printed by the engine after post-processing, if it printed one.
    pub final_path: Option<PathBuf>,
}

/// Sender half handed to the engine. Unbounded so progress never stalls a download.
pub type ProgressSink = mpsc::UnboundedSender<ProgressEvent>;

/// The external extraction/download/transcode capability.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Resolve metadata without downloading anything.
    async fn probe(&self, request: &EngineRequest) -> Result<ProbeResult>;

    /// Download (and post-process) into the request's output directory.
    async fn download(&self, request: &EngineRequest, progress: ProgressSink)
        -> Result<DownloadOutcome>;
}
