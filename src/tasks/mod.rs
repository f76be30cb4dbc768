//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Maintenance: purges entries past the stale retention window and prunes
//!   idle rate-limit buckets

mod cleanup;

pub use cleanup::spawn_cleanup_task;
