use std::sync::Arc;
use tracing::debug;

use crate::adapters::sqlite::CacheStore;
use crate::types::error::Result;
use crate::types::{Attachment, FolderMetadata, Message, MessageSummary, PageCursor};

/// Read-only view of the cache for the UI layer.
///
/// Reads go straight to the store on their own pooled connection and never
/// wait for a running sync. Offset pages are not a snapshot: a sync that
/// commits between two calls can shift messages across page boundaries.
/// Use `list_messages_before` for stable paging while a sync runs.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<CacheStore>,
}

impl QueryService {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    /// At most `limit` summaries, newest first, ties broken by uid descending
    pub fn list_messages(
        &self,
        account: &str,
        folder: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MessageSummary>> {
        debug!("list_messages {}/{} limit={} offset={}", account, folder, limit, offset);
        self.store.list_summaries(account, folder, limit, offset)
    }

    /// Keyset page: the `limit` messages that come after `cursor`
    pub fn list_messages_before(
        &self,
        account: &str,
        folder: &str,
        cursor: Option<PageCursor>,
        limit: usize,
    ) -> Result<Vec<MessageSummary>> {
        self.store.list_summaries_before(account, folder, cursor, limit)
    }

    pub fn count(&self, account: &str, folder: &str) -> Result<u64> {
        self.store.count(account, folder)
    }

    pub fn get_message(&self, account: &str, folder: &str, uid: u32) -> Result<Option<Message>> {
        self.store.get_message(account, folder, uid)
    }

    pub fn get_attachments(&self, account: &str, folder: &str, uid: u32) -> Result<Vec<Attachment>> {
        self.store.get_attachments(account, folder, uid)
    }

    pub fn folder_metadata(&self, account: &str, folder: &str) -> Result<FolderMetadata> {
        self.store.get_folder_metadata(account, folder)
    }
}
