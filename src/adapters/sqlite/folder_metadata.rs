use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{info, warn};

use super::messages::{timestamp_to_datetime, COUNT_SQL};
use super::{write_tx, CacheStore};
use crate::types::error::MailCacheError;
use crate::types::{FolderHealth, FolderMetadata};

const METADATA_COLUMNS: &str =
    "account_email, folder, last_uid, total_messages, last_sync_time, full_sync_pending";

fn row_to_metadata(row: &Row) -> rusqlite::Result<FolderMetadata> {
    let last_sync: Option<i64> = row.get(4)?;
    Ok(FolderMetadata {
        account: row.get(0)?,
        folder: row.get(1)?,
        last_uid: row.get(2)?,
        total_messages: row.get(3)?,
        last_sync_time: last_sync.map(timestamp_to_datetime),
        full_sync_pending: row.get(5)?,
    })
}

fn metadata_in(
    conn: &Connection,
    account: &str,
    folder: &str,
) -> Result<FolderMetadata, MailCacheError> {
    let meta = conn
        .query_row(
            &format!(
                "SELECT {METADATA_COLUMNS} FROM folder_metadata
                 WHERE account_email = ?1 AND folder = ?2"
            ),
            params![account, folder],
            row_to_metadata,
        )
        .optional()?;
    Ok(meta.unwrap_or_else(|| FolderMetadata::empty(account, folder)))
}

/// Record progress for a folder. `last_uid` never moves backwards here;
/// only `reset_folder_metadata` lowers it. Returns the stored watermark.
pub(crate) fn advance_in(
    conn: &Connection,
    account: &str,
    folder: &str,
    last_uid: u32,
    total_messages: u32,
    now: i64,
) -> Result<u32, MailCacheError> {
    conn.execute(
        "INSERT INTO folder_metadata (account_email, folder, last_uid, total_messages, last_sync_time)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(account_email, folder) DO UPDATE SET
            last_uid = MAX(folder_metadata.last_uid, excluded.last_uid),
            total_messages = excluded.total_messages,
            last_sync_time = excluded.last_sync_time",
        params![account, folder, last_uid, total_messages, now],
    )?;

    let stored: u32 = conn.query_row(
        "SELECT last_uid FROM folder_metadata WHERE account_email = ?1 AND folder = ?2",
        params![account, folder],
        |row| row.get(0),
    )?;
    Ok(stored)
}

fn set_pending_in(
    conn: &Connection,
    account: &str,
    folder: &str,
    pending: bool,
) -> Result<(), MailCacheError> {
    conn.execute(
        "INSERT INTO folder_metadata (account_email, folder, full_sync_pending)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(account_email, folder) DO UPDATE SET
            full_sync_pending = excluded.full_sync_pending",
        params![account, folder, pending],
    )?;
    Ok(())
}

impl CacheStore {
    // ========== Folder Metadata Operations ==========

    /// Stored progress, or `(0, 0)` metadata if the folder was never synced
    pub fn get_folder_metadata(
        &self,
        account: &str,
        folder: &str,
    ) -> Result<FolderMetadata, MailCacheError> {
        let conn = self.connection()?;
        metadata_in(&conn, account, folder)
    }

    pub fn set_folder_metadata(
        &self,
        account: &str,
        folder: &str,
        last_uid: u32,
        total_messages: u32,
    ) -> Result<(), MailCacheError> {
        let conn = self.connection()?;
        advance_in(&conn, account, folder, last_uid, total_messages, Utc::now().timestamp())?;
        Ok(())
    }

    /// Forget sync progress so the next sync of the folder is a full one.
    /// Cached messages are kept.
    pub fn reset_folder_metadata(&self, account: &str, folder: &str) -> Result<(), MailCacheError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO folder_metadata (account_email, folder, last_uid, total_messages, last_sync_time, full_sync_pending)
             VALUES (?1, ?2, 0, 0, NULL, 0)
             ON CONFLICT(account_email, folder) DO UPDATE SET
                last_uid = 0,
                total_messages = 0,
                last_sync_time = NULL,
                full_sync_pending = 0",
            params![account, folder],
        )?;
        info!("Reset folder metadata for {}/{}", account, folder);
        Ok(())
    }

    /// Mark the start of a full sync from an empty watermark
    pub fn begin_full_sync(&self, account: &str, folder: &str) -> Result<(), MailCacheError> {
        let conn = self.connection()?;
        set_pending_in(&conn, account, folder, true)
    }

    /// Record the final watermark of a full sync and clear the pending marker
    pub fn finish_full_sync(
        &self,
        account: &str,
        folder: &str,
        last_uid: u32,
        total_messages: u32,
    ) -> Result<u32, MailCacheError> {
        let mut conn = self.connection()?;
        let tx = write_tx(&mut conn)?;
        let stored = advance_in(&tx, account, folder, last_uid, total_messages, Utc::now().timestamp())?;
        set_pending_in(&tx, account, folder, false)?;
        tx.commit()?;
        Ok(stored)
    }

    pub fn list_folder_metadata(&self) -> Result<Vec<FolderMetadata>, MailCacheError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {METADATA_COLUMNS} FROM folder_metadata ORDER BY account_email, folder"
        ))?;
        let rows = stmt.query_map([], row_to_metadata)?;

        let mut folders = Vec::new();
        for row in rows {
            folders.push(row?);
        }
        Ok(folders)
    }

    /// Delete every cached message of a folder together with its metadata
    pub fn clear_folder(&self, account: &str, folder: &str) -> Result<u64, MailCacheError> {
        let mut conn = self.connection()?;
        let tx = write_tx(&mut conn)?;
        let deleted = tx.execute(
            "DELETE FROM emails WHERE account_email = ?1 AND folder = ?2",
            params![account, folder],
        )?;
        tx.execute(
            "DELETE FROM folder_metadata WHERE account_email = ?1 AND folder = ?2",
            params![account, folder],
        )?;
        tx.commit()?;

        info!("Cleared {} messages from {}/{}", deleted, account, folder);
        Ok(deleted as u64)
    }

    /// Compare metadata with the stored rows
    pub fn folder_health(&self, account: &str, folder: &str) -> Result<FolderHealth, MailCacheError> {
        let conn = self.connection()?;
        let meta = metadata_in(&conn, account, folder)?;
        if meta.last_uid == 0 {
            return Ok(FolderHealth::Healthy);
        }

        let count: i64 = conn.query_row(COUNT_SQL, params![account, folder], |row| row.get(0))?;
        if count == 0 {
            let reason = format!(
                "watermark is at uid {} but no messages are cached",
                meta.last_uid
            );
            warn!("{}/{}: {}", account, folder, reason);
            return Ok(FolderHealth::NeedsResync(reason));
        }

        if !meta.full_sync_pending {
            let above: i64 = conn.query_row(
                "SELECT COUNT(*) FROM emails WHERE account_email = ?1 AND folder = ?2 AND uid > ?3",
                params![account, folder, meta.last_uid],
                |row| row.get(0),
            )?;
            if above > 0 {
                let reason = format!(
                    "{} cached messages are above the watermark uid {}",
                    above, meta.last_uid
                );
                warn!("{}/{}: {}", account, folder, reason);
                return Ok(FolderHealth::NeedsResync(reason));
            }
        }

        Ok(FolderHealth::Healthy)
    }
}
