use serde::{Deserialize, Serialize};

use super::folder::FolderKey;

/// How a folder sync fetches messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Enumerate every server uid and fetch the ones not yet committed
    Full,
    /// Fetch only uids above the stored watermark
    Incremental,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Full => write!(f, "full"),
            SyncMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Sync state of a folder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing(SyncMode),
    Error(String),
}

/// Counters collected during one sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub mode: SyncMode,
    /// Full sync picked up above an existing watermark
    pub resumed: bool,
    pub fetched: u32,
    pub inserted: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub resurfaced: u32,
    /// Uids that vanished between enumerate and fetch
    pub skipped: u32,
    pub pruned: u32,
    pub batches: u32,
    pub last_uid: u32,
    pub total_messages: u32,
}

impl SyncReport {
    pub fn new(mode: SyncMode, resumed: bool) -> Self {
        Self {
            mode,
            resumed,
            fetched: 0,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            resurfaced: 0,
            skipped: 0,
            pruned: 0,
            batches: 0,
            last_uid: 0,
            total_messages: 0,
        }
    }
}

/// Result of a trigger request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerOutcome {
    Completed(SyncReport),
    /// Another sync for the same folder was in flight; this trigger was dropped
    AlreadyRunning,
    /// The sync stopped at a batch boundary because of a shutdown request
    Cancelled { last_uid: u32 },
}

/// Event emitted by the sync manager and engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncEvent {
    StateChanged {
        folder: FolderKey,
        state: SyncState,
    },
    BatchCommitted {
        folder: FolderKey,
        committed: u32,
        last_uid: u32,
        total_messages: u32,
    },
    Completed {
        folder: FolderKey,
        report: SyncReport,
    },
    NeedsResync {
        folder: FolderKey,
        reason: String,
    },
}
