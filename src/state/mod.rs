//! Runtime state management
//!
//! Thread-safe ownership of sync engines and per-folder sync state.

mod sync_manager;

pub use sync_manager::SyncManager;
