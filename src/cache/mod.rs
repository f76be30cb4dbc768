//! Cache Module
//!
//! Normalized keys, weather entries and the store backends they live in.

mod entry;
mod file_store;
mod key;
mod store;


// Re-export public types
pub use entry::{CacheEntry, FreshnessState};
pub use file_store::FileStore;
pub use key::{CacheKey, Units};
pub use store::{CacheStore, MemoryStore, PutOutcome};

// == Public Constants ==
/// Maximum normalized location length in bytes, unit suffix excluded
pub const MAX_KEY_LENGTH: usize = 256;
