// Job runner: validates submissions, spawns one supervised task per job and
// drives the engine while mirroring its progress into the store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use super::id::generate_job_id;
use super::record::{JobKind, JobRecord, JobState};
use super::store::JobStore;
use super::workdir::{find_artifact_in, WorkDir};
use crate::config::ServerConfig;
use crate::detect::{parse_source_url, Platform};
use crate::engine::options::{direct_request, search_request};
use crate::engine::{DownloadKind, EngineRequest, MediaEngine, MediaInfo, ProgressEvent};
use crate::error::JobError;
use crate::system::check_cookies_file;

/// Returned to the client as soon as the job exists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub download_id: String,
    pub platform: Platform,
    pub cookies_available: bool,
}

#[derive(Debug, Clone)]
enum JobSpec {
    Direct {
        url: String,
        platform: Platform,
        kind: DownloadKind,
        quality: String,
    },
    Search {
        query: String,
        kind: DownloadKind,
        quality: String,
    },
}

pub struct JobRunner {
    store: Arc<JobStore>,
    engine: Arc<dyn MediaEngine>,
    config: Arc<ServerConfig>,
    tasks: Arc<Mutex<HashMap<String, AbortHandle>>>,
}

impl JobRunner {
    pub fn new(
        store: Arc<JobStore>,
        engine: Arc<dyn MediaEngine>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            store,
            engine,
            config,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    fn quality_or_default(&self, quality: &str) -> String {
        let quality = quality.trim();
        if quality.is_empty() {
            self.config.default_quality.clone()
        } else {
            quality.to_string()
        }
    }

    /// Validate, create the record and start the download. Returns before the
    /// engine is touched.
    pub async fn submit_direct_download(
        &self,
        url: &str,
        kind: DownloadKind,
        quality: &str,
    ) -> Result<Submission, JobError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(JobError::InvalidRequest("URL is required".to_string()));
        }

        let (platform, source) = parse_source_url(url)
            .ok_or_else(|| JobError::UnsupportedSource(url.to_string()))?;

        let cookies_available = check_cookies_file(&self.config.cookies_file).await;
        let id = self.create_record(JobKind::DirectDownload)?;
        info!("job {} submitted: {} {} ({:?})", id, platform, source, kind);

        self.spawn_job(
            id.clone(),
            JobSpec::Direct {
                url: source.to_string(),
                platform,
                kind,
                quality: self.quality_or_default(quality),
            },
            cookies_available,
        );

        Ok(Submission {
            download_id: id,
            platform,
            cookies_available,
        })
    }

    /// Search the engine and download the first hit.
    pub async fn submit_search_download(
        &self,
        query: &str,
        kind: DownloadKind,
        quality: &str,
    ) -> Result<Submission, JobError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(JobError::InvalidRequest(
                "Search query is required".to_string(),
            ));
        }

        let kind = match kind {
            DownloadKind::Best => {
                return Err(JobError::InvalidRequest(
                    "Search type must be video or audio".to_string(),
                ))
            }
            other => other,
        };

        let cookies_available = check_cookies_file(&self.config.cookies_file).await;
        let id = self.create_record(JobKind::SearchDownload)?;
        // Nothing else writes this record until the task below is spawned.
        self.store.update(&id, |r| {
            r.state = JobState::Searching;
            r.platform = Some(Platform::Youtube);
            r.message = "Searching...".to_string();
        });
        info!("job {} submitted: search {:?} ({:?})", id, query, kind);

        self.spawn_job(
            id.clone(),
            JobSpec::Search {
                query: query.to_string(),
                kind,
                quality: self.quality_or_default(quality),
            },
            cookies_available,
        );

        Ok(Submission {
            download_id: id,
            platform: Platform::Youtube,
            cookies_available,
        })
    }

    fn create_record(&self, kind: JobKind) -> Result<String, JobError> {
        let id = generate_job_id(kind);
        self.store
            .create(&id, kind)
            .map_err(|e| JobError::InvalidRequest(e.to_string()))?;
        Ok(id)
    }

    fn spawn_job(&self, id: String, spec: JobSpec, cookies_available: bool) {
        let task = JobTask {
            id: id.clone(),
            cookies_file: cookies_available.then(|| self.config.cookies_file.clone()),
            store: Arc::clone(&self.store),
            engine: Arc::clone(&self.engine),
            config: Arc::clone(&self.config),
        };
        let handle = tokio::spawn(task.run(spec));
        self.tasks.lock().insert(id.clone(), handle.abort_handle());

        let tasks = Arc::clone(&self.tasks);
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match handle.await {
                Ok(()) => debug!("job {} task finished", id),
                Err(e) if e.is_panic() => {
                    error!("job {} task panicked", id);
                    let err = JobError::EngineFailure("job task panicked".to_string());
                    store.update(&id, |r| r.fail(format!("Download failed: {}", err), &err));
                }
                Err(_) => {
                    info!("job {} task aborted", id);
                    let err = JobError::EngineFailure("server shutting down".to_string());
                    store.update(&id, |r| r.fail(format!("Download failed: {}", err), &err));
                }
            }
            tasks.lock().remove(&id);
        });
    }

    /// Ids of jobs whose task is still running.
    pub fn in_flight(&self) -> Vec<String> {
        self.tasks.lock().keys().cloned().collect()
    }

    /// Abort every running job task.
    pub fn shutdown(&self) {
        let tasks = self.tasks.lock();
        if !tasks.is_empty() {
            info!("aborting {} in-flight jobs", tasks.len());
        }
        for handle in tasks.values() {
            handle.abort();
        }
    }
}

/// Everything one job task owns. It is the only writer of its record.
struct JobTask {
    id: String,
    /// Decided at submission; the file is not re-read by the task.
    cookies_file: Option<PathBuf>,
    store: Arc<JobStore>,
    engine: Arc<dyn MediaEngine>,
    config: Arc<ServerConfig>,
}

impl JobTask {
    async fn run(self, spec: JobSpec) {
        let result = match &spec {
            JobSpec::Direct {
                url,
                platform,
                kind,
                quality,
            } => self.run_direct(url, *platform, *kind, quality).await,
            JobSpec::Search {
                query,
                kind,
                quality,
            } => self.run_search(query, *kind, quality).await,
        };

        match result {
            Ok(artifact) => {
                info!("job {} completed: {:?}", self.id, artifact);
                self.store.update(&self.id, |r| r.complete(artifact));
            }
            Err(err) => {
                let message = match (&err, &spec) {
                    (JobError::NoResults(_), _) => "No results found".to_string(),
                    (_, JobSpec::Direct { .. }) => format!("Download failed: {}", err),
                    (_, JobSpec::Search { .. }) => format!("Search failed: {}", err),
                };
                warn!("job {} failed: {}", self.id, err);
                self.store.update(&self.id, |r| r.fail(message, &err));
            }
        }
    }

    async fn run_direct(
        &self,
        url: &str,
        platform: Platform,
        kind: DownloadKind,
        quality: &str,
    ) -> Result<PathBuf, JobError> {
        let dir = self.prepare_work_dir()?;
        let cookies = self.cookies_file.clone();
        let cookies_used = cookies.is_some();
        let request = direct_request(url, platform, kind, quality, &dir, cookies);

        self.store.update(&self.id, |r| {
            r.state = JobState::Downloading;
            r.platform = Some(platform);
            r.cookies_used = cookies_used;
            r.message = "Extracting media info...".to_string();
        });

        let probe = self
            .engine
            .probe(&request)
            .await
            .map_err(JobError::engine)?;
        let info = probe.first().cloned().unwrap_or_default();
        self.record_metadata(&info, "Starting download...", None);

        self.download(&request, &dir).await
    }

    async fn run_search(
        &self,
        query: &str,
        kind: DownloadKind,
        quality: &str,
    ) -> Result<PathBuf, JobError> {
        let dir = self.prepare_work_dir()?;
        let cookies = self.cookies_file.clone();
        let cookies_used = cookies.is_some();
        let request = search_request(query, kind, quality, &dir, cookies);
        self.store.update(&self.id, |r| r.cookies_used = cookies_used);

        let probe = self
            .engine
            .probe(&request)
            .await
            .map_err(JobError::engine)?;
        let entry = probe
            .first()
            .cloned()
            .ok_or_else(|| JobError::NoResults(query.to_string()))?;
        debug!("job {} search hit {:?}", self.id, entry.webpage_url);

        self.record_metadata(
            &entry,
            "Found result, downloading...",
            Some(JobState::Downloading),
        );

        // Download the entry we reported, not whatever the search returns next time.
        let request = match &entry.webpage_url {
            Some(page) => request.retarget(page),
            None => request,
        };
        self.download(&request, &dir).await
    }

    fn prepare_work_dir(&self) -> Result<PathBuf, JobError> {
        let dir = WorkDir::create(&self.config.work_root, &self.id)?;
        let path = dir.path().to_path_buf();
        if let Err(dir) = self.store.attach_work_dir(&self.id, dir) {
            let _ = dir.remove();
            return Err(JobError::WorkDir(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("job {} has no record to own its work dir", self.id),
            )));
        }
        Ok(path)
    }


    fn record_metadata(&self, info: &MediaInfo, message: &str, state: Option<JobState>) {
        let title = info.title.clone().unwrap_or_else(|| "Unknown".to_string());
        let uploader = info.uploader.clone().unwrap_or_else(|| "Unknown".to_string());
        self.store.update(&self.id, |r| {
            r.title = Some(title);
            r.uploader = Some(uploader);
            r.message = message.to_string();
            if let Some(state) = state {
                r.state = state;
            }
        });
    }

    /// Run the engine download, applying progress in arrival order from this
    /// task, then locate the produced file.
    async fn download(&self, request: &EngineRequest, dir: &Path) -> Result<PathBuf, JobError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
        let download = self.engine.download(request, tx);
        tokio::pin!(download);

        let outcome = loop {
            tokio::select! {
                biased;
                Some(event) = rx.recv() => self.apply_progress(&event),
                result = &mut download => break result,
            }
        };
        while let Ok(event) = rx.try_recv() {
            self.apply_progress(&event);
        }

        let outcome = outcome.map_err(JobError::engine)?;
        let artifact = find_artifact_in(dir, outcome.final_path.as_deref())?;
        artifact.ok_or(JobError::ArtifactMissing)
    }

    fn apply_progress(&self, event: &ProgressEvent) {
        let message = event.message();
        self.store.update(&self.id, |r: &mut JobRecord| match event {
            ProgressEvent::Downloading { .. } => {
                if let Some(pct) = event.percent() {
                    r.progress_percent = r.progress_percent.max(pct);
                }
                r.message = message;
            }
            ProgressEvent::Finished { .. } => {
                if r.state < JobState::Processing {
                    r.state = JobState::Processing;
                }
                r.progress_percent = 100;
                r.message = message;
            }
            ProgressEvent::Error { .. } => {
                r.message = message;
            }
        });
    }
}
