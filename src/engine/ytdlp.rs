// yt-dlp process driver: probes metadata and downloads with streamed progress.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::options::EngineRequest;
use super::progress::{parse_progress_line, PROGRESS_TEMPLATE};
use super::traits::{DownloadOutcome, MediaEngine, MediaInfo, ProbeResult, ProgressSink};

/// Stderr lines kept for the failure message.
const STDERR_TAIL_LINES: usize = 50;

/// Stdout prefix for the final path printed after post-processing.
const FILEPATH_MARKER: &str = "[ma-file] ";

pub struct YtDlpEngine {
    bin: String,
}

impl YtDlpEngine {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    /// Arguments shared by probe and download.
    fn common_args(request: &EngineRequest) -> Vec<String> {
        let mut args = vec!["--no-playlist".to_string(), "--no-warnings".to_string()];
        if let Some(cookies) = &request.cookies_file {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().to_string());
        }
        args
    }

    pub fn probe_args(request: &EngineRequest) -> Vec<String> {
        let mut args = Self::common_args(request);
        args.push("--dump-single-json".to_string());
        args.push("--skip-download".to_string());
        args.push("--".to_string());
        args.push(request.target.clone());
        args
    }

    pub fn download_args(request: &EngineRequest) -> Vec<String> {
        let mut args = Self::common_args(request);
        let t = &request.throttle;
        args.extend([
            "-o".to_string(),
            request.output_path_template().to_string_lossy().to_string(),
            "-f".to_string(),
            request.format.clone(),
            "--no-write-info-json".to_string(),
            "--no-write-thumbnail".to_string(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
            "--print".to_string(),
            format!("after_move:{}%(filepath)s", FILEPATH_MARKER),
            "--sleep-interval".to_string(),
            t.sleep_interval.to_string(),
            "--max-sleep-interval".to_string(),
            t.max_sleep_interval.to_string(),
            "--sleep-requests".to_string(),
            t.sleep_requests.to_string(),
            "--sleep-subtitles".to_string(),
            t.sleep_subtitles.to_string(),
        ]);
        if let Some(audio) = &request.audio {
            args.extend([
                "-x".to_string(),
                "--audio-format".to_string(),
                audio.codec.clone(),
                "--audio-quality".to_string(),
                format!("{}K", audio.quality),
            ]);
        }
        args.push("--".to_string());
        args.push(request.target.clone());
        args
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Last meaningful stderr line, which is where yt-dlp puts its `ERROR:` text.
pub fn error_message(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR"))
        .or_else(|| lines.last())
        .map(|l| l.to_string())
        .unwrap_or_else(|| "yt-dlp exited without an error message".to_string())
}

/// Turn `--dump-single-json` output into entries. Playlists (searches) carry `entries`.
pub fn parse_probe_json(raw: &str) -> Result<ProbeResult> {
    let value: Value = serde_json::from_str(raw.trim()).context("invalid yt-dlp JSON output")?;
    match value.get("entries") {
        Some(Value::Array(entries)) => {
            let entries = entries
                .iter()
                .filter(|e| !e.is_null())
                .filter_map(|e| serde_json::from_value::<MediaInfo>(e.clone()).ok())
                .collect();
            Ok(ProbeResult { entries })
        }
        _ => {
            let info: MediaInfo =
                serde_json::from_value(value).context("unexpected yt-dlp metadata shape")?;
            Ok(ProbeResult::single(info))
        }
    }
}

/// Feed every newline-terminated line of `stream` to `on_line`. Invalid UTF-8
/// is replaced rather than ending the read, so the pipe is always drained.
async fn for_each_line<R, F>(stream: R, label: &str, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut segments = BufReader::new(stream).split(b'\n');
    loop {
        match segments.next_segment().await {
            Ok(Some(raw)) => {
                let line = String::from_utf8_lossy(&raw);
                on_line(line.trim_end_matches('\r').to_string());
            }
            Ok(None) => break,
            Err(e) => {
                warn!("yt-dlp {} read failed: {}", label, e);
                break;
            }
        }
    }
}

/// Progress events go to `progress`; the rest is kept as a tail for error reporting.
async fn read_stderr<R>(stream: R, progress: Option<ProgressSink>) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut tail = Vec::new();
    for_each_line(stream, "stderr", |line| {
        if let Some(event) = parse_progress_line(&line) {
            if let Some(tx) = &progress {
                let _ = tx.send(event);
            }
            return;
        }
        debug!("yt-dlp stderr: {}", line);
        tail.push(line);
        if tail.len() > STDERR_TAIL_LINES {
            tail.remove(0);
        }
    })
    .await;
    tail
}

/// Forward progress and return the last final path yt-dlp printed.
async fn read_stdout<R>(stream: R, progress: &ProgressSink) -> Option<PathBuf>
where
    R: AsyncRead + Unpin,
{
    let mut final_path = None;
    for_each_line(stream, "stdout", |line| {
        if let Some(event) = parse_progress_line(&line) {
            let _ = progress.send(event);
        } else if let Some(path) = line.trim().strip_prefix(FILEPATH_MARKER) {
            final_path = Some(PathBuf::from(path.trim()));
        } else if !line.trim().is_empty() {
            debug!("yt-dlp stdout: {}", line);
        }
    })
    .await;
    final_path
}

#[async_trait]
impl MediaEngine for YtDlpEngine {
    async fn probe(&self, request: &EngineRequest) -> Result<ProbeResult> {
        let args = Self::probe_args(request);
        debug!("yt-dlp probe {}", request.target);
        let output = self
            .command(&args)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.bin))?;

        if !output.status.success() {
            return Err(anyhow!(error_message(&String::from_utf8_lossy(
                &output.stderr
            ))));
        }

        parse_probe_json(&String::from_utf8_lossy(&output.stdout))
    }

    async fn download(
        &self,
        request: &EngineRequest,
        progress: ProgressSink,
    ) -> Result<DownloadOutcome> {
        let args = Self::download_args(request);
        info!("yt-dlp download {} -> {:?}", request.target, request.output_dir);

        let mut child = self
            .command(&args)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.bin))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("yt-dlp stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("yt-dlp stderr not captured"))?;

        // Progress can land on either stream depending on quiet mode.
        let stderr_task = tokio::spawn(read_stderr(stderr, Some(progress.clone())));

        let final_path = read_stdout(stdout, &progress).await;

        let status = child.wait().await.context("failed to wait for yt-dlp")?;
        let stderr_tail = stderr_task.await.unwrap_or_else(|e| {
            warn!("stderr reader failed: {}", e);
            Vec::new()
        });

        if !status.success() {
            return Err(anyhow!(error_message(&stderr_tail.join("\n"))));
        }

        Ok(DownloadOutcome { final_path })
    }
}
