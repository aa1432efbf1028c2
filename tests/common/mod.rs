// Shared harness for integration tests: a scripted engine and service setup.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::Notify;

use ma_fetch_engine::config::ServerConfig;
use ma_fetch_engine::engine::{
    DownloadOutcome, EngineRequest, MediaEngine, MediaInfo, ProbeResult, ProgressEvent,
    ProgressSink,
};
use ma_fetch_engine::job::{JobRecord, JobStore};

/// How the fake engine behaves for every request it receives.
#[derive(Debug, Clone)]
pub enum Script {
    /// Resolve one entry, emit progress, write a file and report its path.
    Succeed { title: String, uploader: String },
    /// Probe finds nothing.
    NoResults,
    /// Probe succeeds, download fails with this engine message.
    FailDownload(String),
    /// Download "succeeds" without producing a media file.
    NoArtifact,
}

pub struct FakeEngine {
    script: Script,
    payload: Vec<u8>,
    /// When set, downloads wait here until notified.
    gate: Option<Arc<Notify>>,
    /// Pause after the first progress event.
    after_progress: Option<Arc<Notify>>,
    /// Pause after reporting the download finished, before returning.
    after_finished: Option<Arc<Notify>>,
    requests: Mutex<Vec<EngineRequest>>,
}

impl FakeEngine {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            payload: b"fake media payload".to_vec(),
            gate: None,
            after_progress: None,
            after_finished: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn succeed(title: &str, uploader: &str) -> Self {
        Self::new(Script::Succeed {
            title: title.to_string(),
            uploader: uploader.to_string(),
        })
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn pause_after_progress(mut self, gate: Arc<Notify>) -> Self {
        self.after_progress = Some(gate);
        self
    }

    pub fn pause_after_finished(mut self, gate: Arc<Notify>) -> Self {
        self.after_finished = Some(gate);
        self
    }

    /// Every request seen by `download`, in arrival order.
    pub fn downloads(&self) -> Vec<EngineRequest> {
        self.requests.lock().clone()
    }

    fn info(&self, title: &str, uploader: &str) -> MediaInfo {
        MediaInfo {
            id: Some("abc123".to_string()),
            title: Some(title.to_string()),
            uploader: Some(uploader.to_string()),
            webpage_url: Some("https://www.youtube.com/watch?v=abc123".to_string()),
            ext: Some("mp4".to_string()),
        }
    }
}

/// Expand the engine filename template the way yt-dlp would.
fn render_template(request: &EngineRequest, title: &str, uploader: &str) -> PathBuf {
    let ext = match &request.audio {
        Some(audio) => audio.codec.clone(),
        None => "mp4".to_string(),
    };
    let name = request
        .output_template
        .replace("%(title)s", title)
        .replace("%(uploader)s", uploader)
        .replace("%(id)s", "abc123")
        .replace("%(ext)s", &ext);
    request.output_dir.join(name)
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn probe(&self, _request: &EngineRequest) -> Result<ProbeResult> {
        match &self.script {
            Script::NoResults => Ok(ProbeResult::default()),
            Script::Succeed { title, uploader } => Ok(ProbeResult::single(self.info(title, uploader))),
            _ => Ok(ProbeResult::single(self.info("Clip", "Someone"))),
        }
    }

    async fn download(&self, request: &EngineRequest, progress: ProgressSink) -> Result<DownloadOutcome> {
        self.requests.lock().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match &self.script {
            Script::Succeed { title, uploader } => {
                let total = self.payload.len() as u64;
                let _ = progress.send(ProgressEvent::Downloading {
                    downloaded_bytes: Some(total / 2),
                    total_bytes: Some(total),
                });
                if let Some(gate) = &self.after_progress {
                    gate.notified().await;
                }
                let path = render_template(request, title, uploader);
                tokio::fs::write(&path, &self.payload).await?;
                // A leftover the artifact scan must skip.
                tokio::fs::write(path.with_extension("info.json"), b"{}").await?;
                let _ = progress.send(ProgressEvent::Finished {
                    filename: Some(path.clone()),
                });
                if let Some(gate) = &self.after_finished {
                    gate.notified().await;
                }
                Ok(DownloadOutcome {
                    final_path: Some(path),
                })
            }
            Script::FailDownload(message) => Err(anyhow!("{}", message)),
            Script::NoArtifact => {
                let _ = progress.send(ProgressEvent::Finished { filename: None });
                Ok(DownloadOutcome::default())
            }
            Script::NoResults => Err(anyhow!("nothing to download")),
        }
    }
}

/// Config rooted in a temp dir with no cookies file and fast cleanup.
pub fn test_config(root: &TempDir) -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        work_root: root.path().join("work"),
        cookies_file: root.path().join("cookies.txt"),
        ytdlp_bin: "ma-fetch-test-missing-yt-dlp".to_string(),
        ffmpeg_bin: "ma-fetch-test-missing-ffmpeg".to_string(),
        cleanup_delay_ms: 50,
        ..ServerConfig::default()
    }
}

/// Poll until the job reaches a terminal state.
pub async fn wait_finished(store: &JobStore, id: &str) -> JobRecord {
    for _ in 0..200 {
        if let Some(record) = store.get(id) {
            if record.is_finished() {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish: {:?}", id, store.get(id));
}
