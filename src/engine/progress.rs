// Engine progress events and the yt-dlp progress-template line format.

use std::path::PathBuf;

/// Marker prefixed to every progress line we ask yt-dlp to print.
pub const PROGRESS_MARKER: &str = "[ma-progress]";

/// Value for `--progress-template`. Fields yt-dlp cannot fill are printed as `NA`.
pub const PROGRESS_TEMPLATE: &str = "download:[ma-progress] %(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.filename)s";

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Bytes arriving. Either counter may be unknown.
    Downloading {
        downloaded_bytes: Option<u64>,
        total_bytes: Option<u64>,
    },
    /// One file finished downloading; post-processing may follow.
    Finished { filename: Option<PathBuf> },
    Error { message: String },
}

impl ProgressEvent {
    /// Whole percent when the total is known.
    pub fn percent(&self) -> Option<u8> {
        match self {
            ProgressEvent::Downloading {
                downloaded_bytes: Some(done),
                total_bytes: Some(total),
            } if *total > 0 => Some(((*done as f64 / *total as f64) * 100.0).clamp(0.0, 100.0) as u8),
            _ => None,
        }
    }

    /// Status line shown to polling clients.
    pub fn message(&self) -> String {
        match self {
            ProgressEvent::Downloading {
                downloaded_bytes,
                total_bytes,
            } => match (downloaded_bytes, total_bytes) {
                (Some(done), Some(total)) if *total > 0 => {
                    let pct = (*done as f64 / *total as f64 * 100.0).min(100.0);
                    format!("Downloading... {:.1}%", pct)
                }
                (Some(done), _) => format!("Downloading... {} bytes", done),
                _ => "Downloading...".to_string(),
            },
            ProgressEvent::Finished { .. } => "Processing...".to_string(),
            ProgressEvent::Error { message } => format!("Error: {}", message),
        }
    }
}

fn parse_count(field: &str) -> Option<u64> {
    let field = field.trim();
    if field.is_empty() || field == "NA" || field == "None" {
        return None;
    }
    // Estimates come through as floats.
    field
        .parse::<u64>()
        .ok()
        .or_else(|| field.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64))
}

/// Parse one output line produced with [`PROGRESS_TEMPLATE`]. Other lines yield `None`.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?.trim_start();
    let mut parts = rest.splitn(5, '|');
    let status = parts.next()?.trim();
    let downloaded = parts.next().and_then(parse_count);
    let total = parts.next().and_then(parse_count);
    let estimate = parts.next().and_then(parse_count);
    let filename = parts
        .next()
        .map(str::trim)
        .filter(|f| !f.is_empty() && *f != "NA")
        .map(PathBuf::from);

    match status {
        "downloading" => Some(ProgressEvent::Downloading {
            downloaded_bytes: downloaded,
            total_bytes: total.or(estimate),
        }),
        "finished" => Some(ProgressEvent::Finished { filename }),
        "error" => Some(ProgressEvent::Error {
            message: "download error reported by engine".to_string(),
        }),
        _ => None,
    }
}
