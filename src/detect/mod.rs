// Source detection: which platform a submitted URL belongs to.

pub mod platform;

pub use platform::{detect_platform, parse_source_url, Platform};
