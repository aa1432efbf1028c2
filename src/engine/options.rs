// Engine request building for direct and search jobs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{
    AUDIO_CODEC, MAX_SLEEP_INTERVAL_SECS, SLEEP_INTERVAL_SECS, SLEEP_REQUESTS_SECS,
    SLEEP_SUBTITLES_SECS,
};
use crate::detect::Platform;

/// Format class requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadKind {
    Video,
    Audio,
    Best,
}

impl DownloadKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "video" => Some(DownloadKind::Video),
            "audio" => Some(DownloadKind::Audio),
            "best" => Some(DownloadKind::Best),
            _ => None,
        }
    }
}

/// Audio extraction step run after the download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTranscode {
    pub codec: String,
    /// Bitrate in kbps as the client sent it, e.g. "128".
    pub quality: String,
}

/// Delays between engine requests to stay under rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    pub sleep_interval: u32,
    pub max_sleep_interval: u32,
    pub sleep_requests: u32,
    pub sleep_subtitles: u32,
}

impl Default for Throttle {
    fn default() -> Self {
        Self {
            sleep_interval: SLEEP_INTERVAL_SECS,
            max_sleep_interval: MAX_SLEEP_INTERVAL_SECS,
            sleep_requests: SLEEP_REQUESTS_SECS,
            sleep_subtitles: SLEEP_SUBTITLES_SECS,
        }
    }
}

/// Everything the engine needs to resolve and fetch one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRequest {
    /// A page URL or an engine search expression such as `ytsearch1:query`.
    pub target: String,
    pub output_dir: PathBuf,
    /// Engine filename template, relative to `output_dir`.
    pub output_template: String,
    pub format: String,
    pub audio: Option<AudioTranscode>,
    pub cookies_file: Option<PathBuf>,
    pub throttle: Throttle,
}

impl EngineRequest {
    /// Absolute output template passed to the engine.
    pub fn output_path_template(&self) -> PathBuf {
        self.output_dir.join(&self.output_template)
    }

    /// Same settings, pointed at a different target.
    pub fn retarget(&self, target: &str) -> Self {
        Self {
            target: target.to_string(),
            ..self.clone()
        }
    }
}

/// Engine search expression taking only the first hit.
pub fn search_target(query: &str) -> String {
    format!("ytsearch1:{}", query.trim())
}

/// Filename template for a direct download from `platform`.
pub fn direct_template(platform: Platform) -> String {
    match platform {
        Platform::Youtube => "YT_%(title)s_%(id)s.%(ext)s".to_string(),
        other => match other.file_prefix() {
            Some(prefix) => format!("{}_%(uploader)s_%(title)s_%(id)s.%(ext)s", prefix),
            None => "%(uploader)s_%(title)s_%(id)s.%(ext)s".to_string(),
        },
    }
}

pub const SEARCH_TEMPLATE: &str = "YT_SEARCH_%(title)s_%(id)s.%(ext)s";

fn audio_transcode(quality: &str) -> AudioTranscode {
    AudioTranscode {
        codec: AUDIO_CODEC.to_string(),
        quality: quality.to_string(),
    }
}

/// Request for a direct URL download.
pub fn direct_request(
    url: &str,
    platform: Platform,
    kind: DownloadKind,
    quality: &str,
    output_dir: &Path,
    cookies_file: Option<PathBuf>,
) -> EngineRequest {
    let (format, audio) = match kind {
        DownloadKind::Video => ("best[ext=mp4]/best", None),
        DownloadKind::Audio => ("bestaudio/best", Some(audio_transcode(quality))),
        DownloadKind::Best => ("best", None),
    };

    EngineRequest {
        target: url.trim().to_string(),
        output_dir: output_dir.to_path_buf(),
        output_template: direct_template(platform),
        format: format.to_string(),
        audio,
        cookies_file,
        throttle: Throttle::default(),
    }
}

/// Request for a search-then-download job. Video merges the best streams;
/// anything else is fetched as audio.
pub fn search_request(
    query: &str,
    kind: DownloadKind,
    quality: &str,
    output_dir: &Path,
    cookies_file: Option<PathBuf>,
) -> EngineRequest {
    let (format, audio) = match kind {
        DownloadKind::Video => ("bestvideo+bestaudio/best", None),
        DownloadKind::Audio | DownloadKind::Best => {
            ("bestaudio/best", Some(audio_transcode(quality)))
        }
    };

    EngineRequest {
        target: search_target(query),
        output_dir: output_dir.to_path_buf(),
        output_template: SEARCH_TEMPLATE.to_string(),
        format: format.to_string(),
        audio,
        cookies_file,
        throttle: Throttle::default(),
    }
}
