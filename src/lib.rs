// ma-fetch: HTTP job server that fronts an external media download engine.

pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod job;
pub mod logging;
pub mod server;
pub mod service;
pub mod system;

pub use config::ServerConfig;
pub use error::{ErrorCode, JobError};
pub use server::{AppState, FetchServer};
pub use service::FetchService;
