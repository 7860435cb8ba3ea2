use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies one folder of one account
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FolderKey {
    pub account: String,
    pub folder: String,
}

impl FolderKey {
    pub fn new(account: &str, folder: &str) -> Self {
        Self {
            account: account.to_string(),
            folder: folder.to_string(),
        }
    }
}

impl std::fmt::Display for FolderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.account, self.folder)
    }
}

/// Persisted sync progress of a folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderMetadata {
    pub account: String,
    pub folder: String,
    /// Highest uid whose message is committed locally; 0 means never synced
    pub last_uid: u32,
    /// Server-reported message count as of the last check
    pub total_messages: u32,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Set while a full sync started from zero has not completed yet
    pub full_sync_pending: bool,
}

impl FolderMetadata {
    /// Metadata for a folder that has no stored record
    pub fn empty(account: &str, folder: &str) -> Self {
        Self {
            account: account.to_string(),
            folder: folder.to_string(),
            last_uid: 0,
            total_messages: 0,
            last_sync_time: None,
            full_sync_pending: false,
        }
    }

    /// (last_uid, total_messages)
    pub fn watermark(&self) -> (u32, u32) {
        (self.last_uid, self.total_messages)
    }

    pub fn never_synced(&self) -> bool {
        self.last_uid == 0
    }
}

/// Result of comparing folder metadata with the stored rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason")]
pub enum FolderHealth {
    Healthy,
    NeedsResync(String),
}

impl FolderHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, FolderHealth::Healthy)
    }
}
