use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

use crate::types::error::MailCacheError;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Milliseconds a writer waits on a locked database before failing
const BUSY_TIMEOUT_MS: u32 = 5_000;

fn init_connection(conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(&format!(
        "PRAGMA foreign_keys = ON;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = {};",
        BUSY_TIMEOUT_MS
    ))
}

pub fn create_pool(db_path: &Path, max_size: u32) -> Result<DbPool, MailCacheError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let manager = SqliteConnectionManager::file(db_path).with_init(init_connection);

    let pool = Pool::builder().max_size(max_size).build(manager)?;

    // WAL lets UI reads proceed while a sync batch is being written.
    // The mode is persistent, so one connection is enough.
    let conn = pool.get()?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA mmap_size = 268435456;",
    )?;

    Ok(pool)
}

/// Single-connection pool over a private in-memory database
pub fn create_memory_pool() -> Result<DbPool, MailCacheError> {
    let manager = SqliteConnectionManager::memory().with_init(init_connection);
    let pool = Pool::builder().max_size(1).build(manager)?;
    Ok(pool)
}
