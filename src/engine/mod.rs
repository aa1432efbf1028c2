// Media engine boundary: the opaque extractor/downloader and how we drive it.

pub mod options;
pub mod progress;
pub mod traits;
pub mod ytdlp;

pub use options::{DownloadKind, EngineRequest};
pub use progress::ProgressEvent;
pub use traits::{DownloadOutcome, MediaEngine, MediaInfo, ProbeResult, ProgressSink};
pub use ytdlp::YtDlpEngine;
