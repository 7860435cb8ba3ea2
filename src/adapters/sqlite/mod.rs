//! SQLite cache store
//!
//! Messages live in `emails` keyed by (account_email, folder, uid); sync
//! progress lives in `folder_metadata`. The pool runs in WAL mode so the
//! query service can read while the sync engine commits batches.

pub mod folder_metadata;
pub mod messages;
pub mod pool;
pub mod schema;

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::types::error::MailCacheError;

pub use messages::{BatchOutcome, UpsertOutcome};
pub use pool::{DbConnection, DbPool};

/// Begin a transaction that takes the write lock up front.
///
/// A deferred transaction that reads before writing cannot wait out a
/// concurrent writer under WAL: the upgrade fails with SQLITE_BUSY at once.
pub(crate) fn write_tx(conn: &mut rusqlite::Connection) -> rusqlite::Result<rusqlite::Transaction<'_>> {
    conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
}

/// Persistent message cache
pub struct CacheStore {
    pool: DbPool,
    path: Option<PathBuf>,
}

impl CacheStore {
    /// Open (or create) the store at the given path
    pub fn open(path: &Path, pool_size: u32) -> Result<Self, MailCacheError> {
        info!("Opening cache store at {:?}", path);
        if path.exists() {
            // Check outside the pool: init errors inside r2d2 surface as timeouts.
            let conn = rusqlite::Connection::open(path)?;
            quick_check(&conn)?;
        }

        let pool = pool::create_pool(path, pool_size)?;
        let store = Self {
            pool,
            path: Some(path.to_path_buf()),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Private in-memory store, mainly for tests
    pub fn in_memory() -> Result<Self, MailCacheError> {
        let store = Self {
            pool: pool::create_memory_pool()?,
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), MailCacheError> {
        let conn = self.connection()?;
        schema::initialize_schema(&conn)
    }

    pub fn connection(&self) -> Result<DbConnection, MailCacheError> {
        Ok(self.pool.get()?)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Runs `PRAGMA quick_check`; any finding is reported as a corrupt store
    pub fn integrity_check(&self) -> Result<(), MailCacheError> {
        let conn = self.connection()?;
        quick_check(&conn)
    }
}

fn quick_check(conn: &rusqlite::Connection) -> Result<(), MailCacheError> {
    let mut stmt = conn.prepare("PRAGMA quick_check")?;
    let findings: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<_, _>>()?;

    if findings.len() == 1 && findings[0] == "ok" {
        return Ok(());
    }

    warn!("Cache store failed integrity check: {:?}", findings);
    Err(MailCacheError::CorruptStore(findings.join("; ")))
}
