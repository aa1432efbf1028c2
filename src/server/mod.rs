pub mod handler;

pub use handler::{router, AppState, FetchServer};
