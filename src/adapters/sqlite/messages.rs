use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

use super::{folder_metadata, write_tx, CacheStore};
use crate::types::error::MailCacheError;
use crate::types::{Attachment, EmailAddress, Message, MessageSummary, PageCursor};

/// Upper bound on up-front allocation for a page; larger pages grow as rows arrive
const MAX_PAGE_PREALLOC: usize = 1024;

const SUMMARY_COLUMNS: &str = "uid, message_id, subject, from_addresses, date_received, flags, seen,
    EXISTS(SELECT 1 FROM attachments a
           WHERE a.account_email = emails.account_email
             AND a.folder = emails.folder
             AND a.email_uid = emails.uid)";

pub(crate) const COUNT_SQL: &str =
    "SELECT COUNT(*) FROM emails WHERE account_email = ?1 AND folder = ?2";

pub(crate) fn list_page_sql() -> String {
    format!(
        "SELECT {SUMMARY_COLUMNS} FROM emails
         WHERE account_email = ?1 AND folder = ?2
         ORDER BY date_received DESC, uid DESC
         LIMIT ?3 OFFSET ?4"
    )
}

fn list_before_sql() -> String {
    format!(
        "SELECT {SUMMARY_COLUMNS} FROM emails
         WHERE account_email = ?1 AND folder = ?2
           AND (date_received, uid) < (?3, ?4)
         ORDER BY date_received DESC, uid DESC
         LIMIT ?5"
    )
}

/// What a single upsert did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Flags changed or a missing body was filled in
    Updated,
    Unchanged,
    /// Inserted, but the same Message-ID is already cached under another uid
    Resurfaced { previous_uid: u32 },
}

/// Totals for one committed batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub resurfaced: u32,
    /// Watermark stored after the commit
    pub last_uid: u32,
}

impl BatchOutcome {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
            UpsertOutcome::Resurfaced { .. } => {
                self.inserted += 1;
                self.resurfaced += 1;
            }
        }
    }

    pub fn committed(&self) -> u32 {
        self.inserted + self.updated + self.unchanged
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, MailCacheError> {
    Ok(serde_json::to_string(value)?)
}

/// Malformed JSON degrades to an empty value
fn from_json<T: DeserializeOwned + Default>(raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_default()
}

pub(crate) fn timestamp_to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn row_to_summary(row: &Row) -> rusqlite::Result<MessageSummary> {
    let from: String = row.get(3)?;
    let flags: String = row.get(5)?;
    Ok(MessageSummary {
        uid: row.get(0)?,
        message_id: row.get(1)?,
        subject: row.get(2)?,
        from: from_json(&from),
        received_at: timestamp_to_datetime(row.get(4)?),
        flags: from_json(&flags),
        seen: row.get(6)?,
        has_attachments: row.get(7)?,
    })
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let from: String = row.get(5)?;
    let to: String = row.get(6)?;
    // Nullable in caches written by older versions
    let cc: Option<String> = row.get(7)?;
    let bcc: Option<String> = row.get(8)?;
    let flags: String = row.get(12)?;
    Ok(Message {
        account: row.get(0)?,
        folder: row.get(1)?,
        uid: row.get(2)?,
        message_id: row.get(3)?,
        subject: row.get(4)?,
        from: from_json::<Vec<EmailAddress>>(&from),
        to: from_json(&to),
        cc: cc.as_deref().map(from_json::<Vec<EmailAddress>>).unwrap_or_default(),
        bcc: bcc.as_deref().map(from_json::<Vec<EmailAddress>>).unwrap_or_default(),
        received_at: timestamp_to_datetime(row.get(9)?),
        body_text: row.get(10)?,
        body_html: row.get(11)?,
        flags: from_json(&flags),
        raw_headers: row.get(13)?,
        attachments: Vec::new(),
    })
}

/// Insert the message if its uid is new, otherwise merge the mutable fields.
///
/// Flags are replaced; bodies are only filled when the stored value is
/// NULL. An identical record changes nothing, not even `updated_at`.
pub(crate) fn upsert_in(
    conn: &Connection,
    msg: &Message,
    now: i64,
) -> Result<UpsertOutcome, MailCacheError> {
    let flags = to_json(&msg.flags)?;

    let exists = conn
        .query_row(
            "SELECT 1 FROM emails WHERE account_email = ?1 AND folder = ?2 AND uid = ?3",
            params![msg.account, msg.folder, msg.uid],
            |_| Ok(()),
        )
        .optional()?
        .is_some();

    if exists {
        let changed = conn.execute(
            "UPDATE emails SET
                flags = ?4,
                seen = ?5,
                body_text = COALESCE(body_text, ?6),
                body_html = COALESCE(body_html, ?7),
                updated_at = ?8
             WHERE account_email = ?1 AND folder = ?2 AND uid = ?3
               AND (flags != ?4
                    OR (body_text IS NULL AND ?6 IS NOT NULL)
                    OR (body_html IS NULL AND ?7 IS NOT NULL))",
            params![
                msg.account,
                msg.folder,
                msg.uid,
                flags,
                msg.is_seen(),
                msg.body_text,
                msg.body_html,
                now,
            ],
        )?;
        return Ok(if changed > 0 {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Unchanged
        });
    }

    let previous_uid = match msg.message_id.as_deref().filter(|id| !id.is_empty()) {
        Some(message_id) => find_uid_by_message_id_in(conn, &msg.account, &msg.folder, message_id)?,
        None => None,
    };

    conn.execute(
        "INSERT INTO emails (
            uid, account_email, folder, message_id, subject,
            from_addresses, to_addresses, cc_addresses, bcc_addresses,
            date_received, body_text, body_html, flags, headers, seen,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)",
        params![
            msg.uid,
            msg.account,
            msg.folder,
            msg.message_id,
            msg.subject,
            to_json(&msg.from)?,
            to_json(&msg.to)?,
            to_json(&msg.cc)?,
            to_json(&msg.bcc)?,
            msg.received_at.timestamp(),
            msg.body_text,
            msg.body_html,
            flags,
            msg.raw_headers,
            msg.is_seen(),
            now,
        ],
    )?;

    for attachment in &msg.attachments {
        conn.execute(
            "INSERT INTO attachments (account_email, folder, email_uid, filename, content_type, data, size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                msg.account,
                msg.folder,
                msg.uid,
                attachment.filename,
                attachment.content_type,
                attachment.data,
                attachment.data.len() as i64,
            ],
        )?;
    }

    match previous_uid {
        Some(previous_uid) => {
            debug!(
                "Message {:?} resurfaced in {}/{} as uid {} (was {})",
                msg.message_id, msg.account, msg.folder, msg.uid, previous_uid
            );
            Ok(UpsertOutcome::Resurfaced { previous_uid })
        }
        None => Ok(UpsertOutcome::Inserted),
    }
}

fn find_uid_by_message_id_in(
    conn: &Connection,
    account: &str,
    folder: &str,
    message_id: &str,
) -> Result<Option<u32>, MailCacheError> {
    Ok(conn
        .query_row(
            "SELECT uid FROM emails
             WHERE account_email = ?1 AND folder = ?2 AND message_id = ?3
             ORDER BY uid DESC LIMIT 1",
            params![account, folder, message_id],
            |row| row.get(0),
        )
        .optional()?)
}

impl CacheStore {
    // ========== Write Operations ==========

    /// Insert or merge a single message outside of any batch
    pub fn upsert_message(&self, msg: &Message) -> Result<UpsertOutcome, MailCacheError> {
        let mut conn = self.connection()?;
        let tx = write_tx(&mut conn)?;
        let outcome = upsert_in(&tx, msg, Utc::now().timestamp())?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Upsert a batch and advance the folder watermark in one transaction.
    ///
    /// Either every message and the new `(last_uid, total_messages)` are
    /// durable, or none of them are.
    pub fn commit_batch(
        &self,
        account: &str,
        folder: &str,
        messages: &[Message],
        batch_max_uid: u32,
        total_messages: u32,
    ) -> Result<BatchOutcome, MailCacheError> {
        if let Some(msg) = messages
            .iter()
            .find(|m| m.account != account || m.folder != folder || m.uid > batch_max_uid)
        {
            return Err(MailCacheError::InvalidInput(format!(
                "message {}/{}/{} does not belong to batch {}/{} up to uid {}",
                msg.account, msg.folder, msg.uid, account, folder, batch_max_uid
            )));
        }

        let mut conn = self.connection()?;
        let tx = write_tx(&mut conn)?;
        let now = Utc::now().timestamp();

        let mut outcome = BatchOutcome::default();
        for msg in messages {
            outcome.record(upsert_in(&tx, msg, now)?);
        }
        outcome.last_uid =
            folder_metadata::advance_in(&tx, account, folder, batch_max_uid, total_messages, now)?;

        tx.commit()?;
        Ok(outcome)
    }

    /// Replace the flag set of a cached message; returns false if the uid is not cached
    pub fn set_flags(
        &self,
        account: &str,
        folder: &str,
        uid: u32,
        flags: &[String],
    ) -> Result<bool, MailCacheError> {
        let flags = crate::types::normalize_flags(flags);
        let seen = flags.iter().any(|f| f == crate::types::SEEN_FLAG);
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE emails SET flags = ?4, seen = ?5, updated_at = ?6
             WHERE account_email = ?1 AND folder = ?2 AND uid = ?3",
            params![account, folder, uid, to_json(&flags)?, seen, Utc::now().timestamp()],
        )?;
        Ok(changed > 0)
    }

    /// Delete cached rows whose uid is not in `server_uids`
    pub fn prune_missing(
        &self,
        account: &str,
        folder: &str,
        server_uids: &[u32],
    ) -> Result<u32, MailCacheError> {
        let on_server: HashSet<u32> = server_uids.iter().copied().collect();
        let stale: Vec<u32> = self
            .local_uids(account, folder)?
            .into_iter()
            .filter(|uid| !on_server.contains(uid))
            .collect();

        if stale.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection()?;
        let tx = write_tx(&mut conn)?;
        {
            let mut stmt = tx.prepare(
                "DELETE FROM emails WHERE account_email = ?1 AND folder = ?2 AND uid = ?3",
            )?;
            for uid in &stale {
                stmt.execute(params![account, folder, uid])?;
            }
        }
        tx.commit()?;

        debug!("Pruned {} stale messages from {}/{}", stale.len(), account, folder);
        Ok(stale.len() as u32)
    }

    // ========== Read Operations ==========

    /// Number of cached messages in a folder, answered from an index
    pub fn count(&self, account: &str, folder: &str) -> Result<u64, MailCacheError> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row(COUNT_SQL, params![account, folder], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Page of summaries ordered by received time then uid, newest first
    pub fn list_summaries(
        &self,
        account: &str,
        folder: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MessageSummary>, MailCacheError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(&list_page_sql())?;
        let rows = stmt.query_map(
            params![account, folder, clamp_i64(limit), clamp_i64(offset)],
            row_to_summary,
        )?;

        let mut page = Vec::with_capacity(limit.min(MAX_PAGE_PREALLOC));
        for row in rows {
            page.push(row?);
        }
        Ok(page)
    }

    /// Page of summaries strictly after `cursor` in listing order
    pub fn list_summaries_before(
        &self,
        account: &str,
        folder: &str,
        cursor: Option<PageCursor>,
        limit: usize,
    ) -> Result<Vec<MessageSummary>, MailCacheError> {
        let Some(cursor) = cursor else {
            return self.list_summaries(account, folder, limit, 0);
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(&list_before_sql())?;
        let rows = stmt.query_map(
            params![account, folder, cursor.received_at, cursor.uid, clamp_i64(limit)],
            row_to_summary,
        )?;

        let mut page = Vec::with_capacity(limit.min(MAX_PAGE_PREALLOC));
        for row in rows {
            page.push(row?);
        }
        Ok(page)
    }

    /// Full message including attachments
    pub fn get_message(
        &self,
        account: &str,
        folder: &str,
        uid: u32,
    ) -> Result<Option<Message>, MailCacheError> {
        let conn = self.connection()?;
        let message = conn
            .query_row(
                "SELECT account_email, folder, uid, message_id, subject,
                        from_addresses, to_addresses, cc_addresses, bcc_addresses,
                        date_received, body_text, body_html, flags, headers
                 FROM emails WHERE account_email = ?1 AND folder = ?2 AND uid = ?3",
                params![account, folder, uid],
                row_to_message,
            )
            .optional()?;

        match message {
            Some(mut message) => {
                message.attachments = attachments_in(&conn, account, folder, uid)?;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    pub fn get_attachments(
        &self,
        account: &str,
        folder: &str,
        uid: u32,
    ) -> Result<Vec<Attachment>, MailCacheError> {
        let conn = self.connection()?;
        attachments_in(&conn, account, folder, uid)
    }

    pub fn find_uid_by_message_id(
        &self,
        account: &str,
        folder: &str,
        message_id: &str,
    ) -> Result<Option<u32>, MailCacheError> {
        let conn = self.connection()?;
        find_uid_by_message_id_in(&conn, account, folder, message_id)
    }

    /// All cached uids of a folder, ascending
    pub fn local_uids(&self, account: &str, folder: &str) -> Result<Vec<u32>, MailCacheError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT uid FROM emails WHERE account_email = ?1 AND folder = ?2 ORDER BY uid",
        )?;
        let rows = stmt.query_map(params![account, folder], |row| row.get(0))?;

        let mut uids = Vec::new();
        for row in rows {
            uids.push(row?);
        }
        Ok(uids)
    }
}

fn attachments_in(
    conn: &Connection,
    account: &str,
    folder: &str,
    uid: u32,
) -> Result<Vec<Attachment>, MailCacheError> {
    let mut stmt = conn.prepare(
        "SELECT filename, content_type, data FROM attachments
         WHERE account_email = ?1 AND folder = ?2 AND email_uid = ?3
         ORDER BY id",
    )?;
    let rows = stmt.query_map(params![account, folder, uid], |row| {
        Ok(Attachment::new(row.get(0)?, row.get(1)?, row.get(2)?))
    })?;

    let mut attachments = Vec::new();
    for row in rows {
        match row {
            Ok(attachment) => attachments.push(attachment),
            Err(e) => warn!("Skipping unreadable attachment of uid {}: {}", uid, e),
        }
    }
    Ok(attachments)
}

fn clamp_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{normalize_flags, SEEN_FLAG};
    use chrono::TimeZone;

    const ACCOUNT: &str = "me@example.com";
    const FOLDER: &str = "INBOX";

    fn message(uid: u32, secs: i64) -> Message {
        let mut msg = Message::new(ACCOUNT, FOLDER, uid, Utc.timestamp_opt(secs, 0).unwrap());
        msg.message_id = Some(format!("<{}@example.com>", uid));
        msg.subject = format!("Message {}", uid);
        msg.from = vec![EmailAddress::new(Some("Alice"), "alice@example.com")];
        msg.body_text = Some(format!("body {}", uid));
        msg.raw_headers = format!("Subject: Message {}\r\n", uid);
        msg
    }

    fn snapshot(store: &CacheStore) -> Vec<(u32, String, String, Option<String>, i64)> {
        let conn = store.connection().unwrap();
        let mut stmt = conn
            .prepare("SELECT uid, subject, flags, body_text, updated_at FROM emails ORDER BY uid")
            .unwrap();
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })
            .unwrap();
        rows.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = CacheStore::in_memory().expect("Failed to create store");
        let msg = message(7, 1_700_000_000);

        assert_eq!(store.upsert_message(&msg).unwrap(), UpsertOutcome::Inserted);
        let after_first = snapshot(&store);

        assert_eq!(store.upsert_message(&msg).unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(snapshot(&store), after_first);
        assert_eq!(store.count(ACCOUNT, FOLDER).unwrap(), 1);
    }

    #[test]
    fn test_upsert_updates_flags_only() {
        let store = CacheStore::in_memory().unwrap();
        let mut msg = message(3, 1_700_000_000);
        store.upsert_message(&msg).unwrap();

        msg.flags = normalize_flags([SEEN_FLAG]);
        msg.subject = "changed upstream".to_string();
        assert_eq!(store.upsert_message(&msg).unwrap(), UpsertOutcome::Updated);

        let cached = store.get_message(ACCOUNT, FOLDER, 3).unwrap().unwrap();
        assert!(cached.is_seen());
        assert_eq!(cached.subject, "Message 3");
    }

    #[test]
    fn test_body_filled_once_then_immutable() {
        let store = CacheStore::in_memory().unwrap();
        let mut msg = message(5, 1_700_000_000);
        msg.body_text = None;
        store.upsert_message(&msg).unwrap();

        msg.body_text = Some("first body".into());
        assert_eq!(store.upsert_message(&msg).unwrap(), UpsertOutcome::Updated);

        msg.body_text = Some("second body".into());
        assert_eq!(store.upsert_message(&msg).unwrap(), UpsertOutcome::Unchanged);

        let cached = store.get_message(ACCOUNT, FOLDER, 5).unwrap().unwrap();
        assert_eq!(cached.body_text.as_deref(), Some("first body"));
    }

    #[test]
    fn test_resurfaced_message_id_detected() {
        let store = CacheStore::in_memory().unwrap();
        let old = message(10, 1_700_000_000);
        store.upsert_message(&old).unwrap();

        let mut renumbered = old.clone();
        renumbered.uid = 42;
        assert_eq!(
            store.upsert_message(&renumbered).unwrap(),
            UpsertOutcome::Resurfaced { previous_uid: 10 }
        );
        assert_eq!(
            store.find_uid_by_message_id(ACCOUNT, FOLDER, "<10@example.com>").unwrap(),
            Some(42)
        );
    }

    #[test]
    fn test_commit_batch_advances_watermark() {
        let store = CacheStore::in_memory().unwrap();
        let batch: Vec<Message> = (1..=5).map(|uid| message(uid, 1_700_000_000 + uid as i64)).collect();

        let outcome = store.commit_batch(ACCOUNT, FOLDER, &batch, 5, 12).unwrap();
        assert_eq!(outcome.inserted, 5);
        assert_eq!(outcome.last_uid, 5);

        let meta = store.get_folder_metadata(ACCOUNT, FOLDER).unwrap();
        assert_eq!(meta.watermark(), (5, 12));
        assert!(meta.last_sync_time.is_some());
    }

    #[test]
    fn test_commit_batch_rejects_uid_above_watermark() {
        let store = CacheStore::in_memory().unwrap();
        let batch = vec![message(9, 1_700_000_000)];

        let err = store.commit_batch(ACCOUNT, FOLDER, &batch, 8, 9).unwrap_err();
        assert!(matches!(err, MailCacheError::InvalidInput(_)));
        assert_eq!(store.count(ACCOUNT, FOLDER).unwrap(), 0);
        assert_eq!(store.get_folder_metadata(ACCOUNT, FOLDER).unwrap().watermark(), (0, 0));
    }

    #[test]
    fn test_listing_order_with_equal_timestamps() {
        let store = CacheStore::in_memory().unwrap();
        for uid in 1..=6 {
            // Pairs share a timestamp
            store.upsert_message(&message(uid, 1_700_000_000 + (uid as i64 / 2))).unwrap();
        }

        let uids: Vec<u32> = store
            .list_summaries(ACCOUNT, FOLDER, 10, 0)
            .unwrap()
            .iter()
            .map(|s| s.uid)
            .collect();
        assert_eq!(uids, vec![6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_keyset_pages_follow_cursor() {
        let store = CacheStore::in_memory().unwrap();
        for uid in 1..=25 {
            store.upsert_message(&message(uid, 1_700_000_000 + (uid as i64 % 4))).unwrap();
        }

        let expected = store.list_summaries(ACCOUNT, FOLDER, 25, 0).unwrap();
        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = store.list_summaries_before(ACCOUNT, FOLDER, cursor, 7).unwrap();
            if page.is_empty() {
                break;
            }
            cursor = page.last().map(MessageSummary::cursor);
            seen.extend(page);
        }
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_attachments_cascade_on_prune() {
        let store = CacheStore::in_memory().unwrap();
        let mut msg = message(1, 1_700_000_000);
        msg.attachments = vec![Attachment::new(
            Some("notes.txt".into()),
            "text/plain".into(),
            b"hello".to_vec(),
        )];
        store.upsert_message(&msg).unwrap();
        store.upsert_message(&message(2, 1_700_000_001)).unwrap();

        let summaries = store.list_summaries(ACCOUNT, FOLDER, 10, 0).unwrap();
        assert!(summaries.iter().any(|s| s.uid == 1 && s.has_attachments));
        assert_eq!(store.get_attachments(ACCOUNT, FOLDER, 1).unwrap()[0].size, 5);

        assert_eq!(store.prune_missing(ACCOUNT, FOLDER, &[2]).unwrap(), 1);
        assert!(store.get_attachments(ACCOUNT, FOLDER, 1).unwrap().is_empty());
        assert_eq!(store.local_uids(ACCOUNT, FOLDER).unwrap(), vec![2]);
    }

    #[test]
    fn test_set_flags_keeps_watermark() {
        let store = CacheStore::in_memory().unwrap();
        store.commit_batch(ACCOUNT, FOLDER, &[message(4, 1_700_000_000)], 4, 1).unwrap();

        assert!(store.set_flags(ACCOUNT, FOLDER, 4, &[SEEN_FLAG.to_string()]).unwrap());
        assert!(!store.set_flags(ACCOUNT, FOLDER, 99, &[]).unwrap());

        let summary = &store.list_summaries(ACCOUNT, FOLDER, 1, 0).unwrap()[0];
        assert!(summary.seen);
        assert_eq!(store.get_folder_metadata(ACCOUNT, FOLDER).unwrap().last_uid, 4);
    }

    #[test]
    fn test_zero_limit_returns_nothing() {
        let store = CacheStore::in_memory().unwrap();
        store.upsert_message(&message(1, 1_700_000_000)).unwrap();
        assert!(store.list_summaries(ACCOUNT, FOLDER, 0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_query_plans_use_indexes() {
        let store = CacheStore::in_memory().unwrap();
        let conn = store.connection().unwrap();

        let plan = |sql: &str, params: &[&dyn rusqlite::ToSql]| -> String {
            let mut stmt = conn.prepare(&format!("EXPLAIN QUERY PLAN {}", sql)).unwrap();
            let rows = stmt
                .query_map(params, |row| row.get::<_, String>(3))
                .unwrap();
            rows.map(|r| r.unwrap()).collect::<Vec<_>>().join("\n")
        };

        let list_plan = plan(&list_page_sql(), params![ACCOUNT, FOLDER, 1000i64, 0i64]);
        assert!(list_plan.contains("idx_emails_received"), "{}", list_plan);
        assert!(!list_plan.contains("TEMP B-TREE"), "{}", list_plan);

        let count_plan = plan(COUNT_SQL, params![ACCOUNT, FOLDER]);
        assert!(count_plan.contains("COVERING INDEX"), "{}", count_plan);
    }
}
