use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::types::error::MailCacheError;

pub fn initialize_schema(conn: &Connection) -> Result<(), MailCacheError> {
    conn.execute_batch(
        "
        -- Cached messages, one row per (account, folder, uid)
        CREATE TABLE IF NOT EXISTS emails (
            uid             INTEGER NOT NULL,
            account_email   TEXT NOT NULL,
            folder          TEXT NOT NULL,
            message_id      TEXT,               -- RFC 5322 Message-ID header
            subject         TEXT NOT NULL DEFAULT '',
            from_addresses  TEXT NOT NULL DEFAULT '[]',  -- JSON array
            to_addresses    TEXT NOT NULL DEFAULT '[]',  -- JSON array
            cc_addresses    TEXT NOT NULL DEFAULT '[]',  -- JSON array
            bcc_addresses   TEXT NOT NULL DEFAULT '[]',  -- JSON array
            date_received   INTEGER NOT NULL,   -- unix epoch seconds
            body_text       TEXT,
            body_html       TEXT,
            flags           TEXT NOT NULL DEFAULT '[]',  -- JSON array (\\Seen, \\Answered, ...)
            headers         TEXT NOT NULL DEFAULT '',    -- raw header section
            seen            INTEGER NOT NULL DEFAULT 0,
            created_at      INTEGER NOT NULL,   -- unix epoch seconds
            updated_at      INTEGER NOT NULL,
            PRIMARY KEY (account_email, folder, uid)
        );

        -- Listing order is date_received DESC, uid DESC; keeping both in the
        -- index lets SQLite walk it instead of sorting.
        CREATE INDEX IF NOT EXISTS idx_emails_received
            ON emails(account_email, folder, date_received DESC, uid DESC);
        CREATE INDEX IF NOT EXISTS idx_emails_message_id
            ON emails(account_email, folder, message_id);

        CREATE TABLE IF NOT EXISTS attachments (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            account_email   TEXT NOT NULL,
            folder          TEXT NOT NULL,
            email_uid       INTEGER NOT NULL,
            filename        TEXT,
            content_type    TEXT NOT NULL,
            data            BLOB NOT NULL,
            size            INTEGER NOT NULL,
            FOREIGN KEY (account_email, folder, email_uid)
                REFERENCES emails(account_email, folder, uid) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_attachments_email
            ON attachments(account_email, folder, email_uid);

        -- Per-folder sync progress
        CREATE TABLE IF NOT EXISTS folder_metadata (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            account_email       TEXT NOT NULL,
            folder              TEXT NOT NULL,
            last_uid            INTEGER NOT NULL DEFAULT 0,
            total_messages      INTEGER NOT NULL DEFAULT 0,
            last_sync_time      INTEGER,        -- unix epoch seconds
            full_sync_pending   INTEGER NOT NULL DEFAULT 0,
            UNIQUE(account_email, folder)
        );
        ",
    )?;

    migrate_folder_metadata(conn)?;
    migrate_attachments(conn)?;

    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, MailCacheError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn column_not_null(conn: &Connection, table: &str, column: &str) -> Result<bool, MailCacheError> {
    let not_null: Option<i64> = conn
        .query_row(
            "SELECT \"notnull\" FROM pragma_table_info(?1) WHERE name = ?2",
            params![table, column],
            |row| row.get(0),
        )
        .optional()?;
    Ok(not_null == Some(1))
}

/// Older caches declare `attachments.filename NOT NULL`, which rejects
/// unnamed parts. SQLite cannot drop a constraint in place, so the table is
/// rebuilt with its rows.
fn migrate_attachments(conn: &Connection) -> Result<(), MailCacheError> {
    if !column_not_null(conn, "attachments", "filename")? {
        return Ok(());
    }

    info!("Migrating attachments: making filename nullable");
    conn.execute_batch(
        "BEGIN IMMEDIATE;
         CREATE TABLE attachments_migrated (
             id              INTEGER PRIMARY KEY AUTOINCREMENT,
             account_email   TEXT NOT NULL,
             folder          TEXT NOT NULL,
             email_uid       INTEGER NOT NULL,
             filename        TEXT,
             content_type    TEXT NOT NULL,
             data            BLOB NOT NULL,
             size            INTEGER NOT NULL,
             FOREIGN KEY (account_email, folder, email_uid)
                 REFERENCES emails(account_email, folder, uid) ON DELETE CASCADE
         );
         INSERT INTO attachments_migrated
             (id, account_email, folder, email_uid, filename, content_type, data, size)
             SELECT id, account_email, folder, email_uid, filename, content_type, data, size
             FROM attachments;
         DROP TABLE attachments;
         ALTER TABLE attachments_migrated RENAME TO attachments;
         CREATE INDEX IF NOT EXISTS idx_attachments_email
             ON attachments(account_email, folder, email_uid);
         COMMIT;",
    )?;
    Ok(())
}

/// Brings databases created with the older `last_sync` layout up to date
fn migrate_folder_metadata(conn: &Connection) -> Result<(), MailCacheError> {
    if !column_exists(conn, "folder_metadata", "last_sync_time")? {
        info!("Migrating folder_metadata: adding last_sync_time");
        conn.execute_batch("ALTER TABLE folder_metadata ADD COLUMN last_sync_time INTEGER;")?;
        if column_exists(conn, "folder_metadata", "last_sync")? {
            conn.execute_batch(
                "UPDATE folder_metadata SET last_sync_time = last_sync WHERE last_sync > 0;",
            )?;
        }
    }

    if !column_exists(conn, "folder_metadata", "full_sync_pending")? {
        info!("Migrating folder_metadata: adding full_sync_pending");
        conn.execute_batch(
            "ALTER TABLE folder_metadata ADD COLUMN full_sync_pending INTEGER NOT NULL DEFAULT 0;",
        )?;
    }

    Ok(())
}
