use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

/// Delay between handing an artifact to the client and deleting its work dir.
pub const CLEANUP_DELAY_MS: u64 = 1_000;

/// Terminal jobs untouched for this long are reclaimed by the sweeper (30 min).
pub const ABANDON_AFTER_SECS: u64 = 30 * 60;

/// How often the sweeper looks for abandoned jobs.
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// Audio bitrate (kbps) used when the client does not send one.
pub const DEFAULT_AUDIO_QUALITY: &str = "192";

/// Codec audio downloads are transcoded to.
pub const AUDIO_CODEC: &str = "mp3";

/// Throttling passed to the engine to stay under platform bot detection.
pub const SLEEP_INTERVAL_SECS: u32 = 1;
pub const MAX_SLEEP_INTERVAL_SECS: u32 = 5;
pub const SLEEP_REQUESTS_SECS: u32 = 1;
pub const SLEEP_SUBTITLES_SECS: u32 = 1;

/// Environment variable naming an optional JSON config file.
pub const CONFIG_PATH_ENV: &str = "MA_FETCH_CONFIG";

/// Top-level configuration for the fetch server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Parent directory for per-job work dirs.
    pub work_root: PathBuf,
    /// yt-dlp executable.
    pub ytdlp_bin: String,
    /// ffmpeg executable, only probed for availability.
    pub ffmpeg_bin: String,
    /// Netscape cookies file handed to the engine when present and non-empty.
    pub cookies_file: PathBuf,
    pub default_quality: String,
    pub cleanup_delay_ms: u64,
    /// Zero disables the abandonment sweep.
    pub abandon_after_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            work_root: std::env::temp_dir().join("ma-fetch"),
            ytdlp_bin: "yt-dlp".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            cookies_file: PathBuf::from("cookies.txt"),
            default_quality: DEFAULT_AUDIO_QUALITY.to_string(),
            cleanup_delay_ms: CLEANUP_DELAY_MS,
            abandon_after_secs: ABANDON_AFTER_SECS,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
        }
    }
}

impl ServerConfig {
    /// Load from the optional JSON file in `MA_FETCH_CONFIG`, then apply
    /// `MA_FETCH_*` environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path))?;
        info!("loaded config from {}", path);
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process env in production).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("MA_FETCH_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = get("MA_FETCH_WORK_ROOT") {
            self.work_root = PathBuf::from(v);
        }
        if let Some(v) = get("MA_FETCH_YTDLP_BIN") {
            self.ytdlp_bin = v;
        }
        if let Some(v) = get("MA_FETCH_FFMPEG_BIN") {
            self.ffmpeg_bin = v;
        }
        if let Some(v) = get("MA_FETCH_COOKIES_FILE") {
            self.cookies_file = PathBuf::from(v);
        }
        if let Some(v) = get("MA_FETCH_DEFAULT_QUALITY") {
            self.default_quality = v;
        }
        for (name, slot) in [
            ("MA_FETCH_CLEANUP_DELAY_MS", &mut self.cleanup_delay_ms),
            ("MA_FETCH_ABANDON_AFTER_SECS", &mut self.abandon_after_secs),
            ("MA_FETCH_SWEEP_INTERVAL_SECS", &mut self.sweep_interval_secs),
        ] {
            if let Some(v) = get(name) {
                match v.parse::<u64>() {
                    Ok(n) => *slot = n,
                    Err(_) => warn!("ignoring {}={:?}: not an integer", name, v),
                }
            }
        }
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_delay_ms)
    }

    pub fn abandon_after(&self) -> Option<Duration> {
        (self.abandon_after_secs > 0).then(|| Duration::from_secs(self.abandon_after_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
