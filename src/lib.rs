//! mailcache - local email cache with incremental, resumable folder sync
//!
//! The cache keeps every synced message of a folder in SQLite and tracks a
//! per-folder watermark (`last_uid`). Syncs commit in uid-ascending batches
//! together with the watermark, so they can be interrupted at any point and
//! resumed without refetching committed messages. The UI reads bounded,
//! ordered pages while a sync is running.
//!
//! ## Module Organization
//!
//! - `commands/`: Operator commands (trigger sync, reset metadata, shutdown)
//! - `services/`: Query service for the UI layer
//! - `state/`: Sync manager (per-folder locks, status, cancellation)
//! - `engine/`: Sync engine (full and incremental sync)
//! - `adapters/`: SQLite cache store and the mail transport seam
//! - `config/`: Configuration management
//! - `types/`: Data structures and errors

pub mod adapters;
pub mod commands;
pub mod config;
pub mod engine;
pub mod services;
pub mod state;
pub mod types;

pub use adapters::sqlite::CacheStore;
pub use adapters::transport::{MailTransport, MemoryTransport, RemoteMessage};
pub use engine::{SyncConfig, SyncEngine};
pub use services::QueryService;
pub use state::SyncManager;
pub use types::error::{MailCacheError, Result, TransportError};

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber honoring `RUST_LOG`.
///
/// Debug builds default to debug logs for this crate, release builds to info.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("mailcache=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });

    // A subscriber may already be installed by the embedding application
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
