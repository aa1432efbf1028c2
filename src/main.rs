// Server binary: load config, report tool availability, serve until Ctrl-C.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use ma_fetch_engine::config::ServerConfig;
use ma_fetch_engine::engine::YtDlpEngine;
use ma_fetch_engine::logging::init_tracing;
use ma_fetch_engine::server::FetchServer;
use ma_fetch_engine::service::FetchService;
use ma_fetch_engine::system::log_startup_checks;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ServerConfig::load()?;
    info!("work root {:?}", config.work_root);
    log_startup_checks(&config).await;

    let engine = Arc::new(YtDlpEngine::new(config.ytdlp_bin.clone()));
    let bind_addr = config.bind_addr.clone();
    let service = FetchService::start(config, engine);
    let server = FetchServer::start(service.app_state(), &bind_addr).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    server.shutdown().await;
    service.shutdown().await;
    Ok(())
}
