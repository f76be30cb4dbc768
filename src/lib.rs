//! Weather Cache - a weather data cache with single-flight refresh
//!
//! Serves unconditional, conditional and forced reads of weather data per
//! location, keeping at most one upstream fetch in flight per location.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod limiter;
pub mod models;
pub mod tasks;
pub mod upstream;

pub use api::AppState;
pub use config::Config;
pub use coordinator::{ReadOutcome, ReadStatus, RefreshCoordinator, RequestMode};
pub use tasks::spawn_cleanup_task;
