// Service wiring: owns the job store and everything that shares it.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ServerConfig;
use crate::engine::MediaEngine;
use crate::job::sweeper::spawn_sweeper;
use crate::job::{ArtifactHandoff, JobRunner, JobStore};
use crate::server::handler::AppState;

pub struct FetchService {
    store: Arc<JobStore>,
    runner: Arc<JobRunner>,
    handoff: Arc<ArtifactHandoff>,
    config: Arc<ServerConfig>,
    shutdown_token: CancellationToken,
    sweeper: Option<JoinHandle<()>>,
}

impl FetchService {
    /// Build the store, runner and handoff and start the abandonment sweeper.
    /// Must be called inside a tokio runtime.
    pub fn start(config: ServerConfig, engine: Arc<dyn MediaEngine>) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(JobStore::new());
        let runner = Arc::new(JobRunner::new(
            Arc::clone(&store),
            engine,
            Arc::clone(&config),
        ));
        let handoff = Arc::new(ArtifactHandoff::new(
            Arc::clone(&store),
            config.cleanup_delay(),
        ));
        let shutdown_token = CancellationToken::new();

        let sweeper = config.abandon_after().map(|ttl| {
            info!(
                "abandoned jobs reclaimed after {}s (checked every {}s)",
                ttl.as_secs(),
                config.sweep_interval().as_secs()
            );
            spawn_sweeper(
                Arc::clone(&store),
                ttl,
                config.sweep_interval(),
                shutdown_token.clone(),
            )
        });

        Self {
            store,
            runner,
            handoff,
            config,
            shutdown_token,
            sweeper,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            runner: Arc::clone(&self.runner),
            handoff: Arc::clone(&self.handoff),
            config: Arc::clone(&self.config),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn runner(&self) -> &Arc<JobRunner> {
        &self.runner
    }

    /// Abort running jobs, stop the sweeper and delete every work dir.
    pub async fn shutdown(mut self) {
        self.runner.shutdown();
        self.shutdown_token.cancel();
        if let Some(sweeper) = self.sweeper.take() {
            let _ = sweeper.await;
        }
        let store = Arc::clone(&self.store);
        let _ = tokio::task::spawn_blocking(move || store.clear()).await;
        info!("fetch service stopped");
    }
}
