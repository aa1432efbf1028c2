// Capability checks for the external tools and the engine's cookies file.

use std::path::Path;
use std::process::Stdio;

use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;

/// True when `bin -version`/`--version` runs and exits cleanly.
pub async fn tool_available(bin: &str, version_flag: &str) -> bool {
    let result = Command::new(bin)
        .arg(version_flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match result {
        Ok(status) => status.success(),
        Err(e) => {
            debug!("{} not runnable: {}", bin, e);
            false
        }
    }
}

pub async fn check_ffmpeg(bin: &str) -> bool {
    tool_available(bin, "-version").await
}

pub async fn check_ytdlp(bin: &str) -> bool {
    tool_available(bin, "--version").await
}

/// A cookies file only counts when it exists and has content.
pub async fn check_cookies_file(path: &Path) -> bool {
    match tokio::fs::read(path).await {
        Ok(content) => content.iter().any(|b| !b.is_ascii_whitespace()),
        Err(_) => false,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub ffmpeg_available: bool,
    pub yt_dlp_available: bool,
    pub cookies_available: bool,
    pub cookies_file: String,
}

pub async fn system_status(config: &ServerConfig) -> SystemStatus {
    let (ffmpeg_available, yt_dlp_available) = tokio::join!(
        check_ffmpeg(&config.ffmpeg_bin),
        check_ytdlp(&config.ytdlp_bin)
    );
    SystemStatus {
        ffmpeg_available,
        yt_dlp_available,
        cookies_available: check_cookies_file(&config.cookies_file).await,
        cookies_file: config.cookies_file.to_string_lossy().to_string(),
    }
}

/// Startup report of what the engine will be able to do.
pub async fn log_startup_checks(config: &ServerConfig) {
    let status = system_status(config).await;
    info!("ffmpeg available: {}", status.ffmpeg_available);
    info!("yt-dlp available: {}", status.yt_dlp_available);
    if status.cookies_available {
        info!("using cookies from {}", status.cookies_file);
    } else {
        warn!(
            "no cookies file at {}; add one to avoid bot detection",
            status.cookies_file
        );
    }
    if !status.yt_dlp_available {
        warn!("{} is not runnable; every job will fail", config.ytdlp_bin);
    }
}
