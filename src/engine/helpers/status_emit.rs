use flume::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use tracing::trace;

use crate::types::{FolderKey, SyncEvent, SyncReport, SyncState};

/// Fan-out of sync events to any number of subscribers.
///
/// Subscribers whose receiver was dropped are removed on the next emit.
#[derive(Clone, Default)]
pub struct StatusEmitter {
    subscribers: Arc<Mutex<Vec<Sender<SyncEvent>>>>,
}

impl StatusEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<SyncEvent> {
        let (tx, rx) = flume::unbounded();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn emit(&self, event: SyncEvent) {
        trace!("sync event: {:?}", event);
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn emit_state(&self, folder: &FolderKey, state: SyncState) {
        self.emit(SyncEvent::StateChanged {
            folder: folder.clone(),
            state,
        });
    }

    pub fn emit_batch(&self, folder: &FolderKey, committed: u32, last_uid: u32, total_messages: u32) {
        self.emit(SyncEvent::BatchCommitted {
            folder: folder.clone(),
            committed,
            last_uid,
            total_messages,
        });
    }

    pub fn emit_completed(&self, folder: &FolderKey, report: &SyncReport) {
        self.emit(SyncEvent::Completed {
            folder: folder.clone(),
            report: report.clone(),
        });
    }

    pub fn emit_needs_resync(&self, folder: &FolderKey, reason: &str) {
        self.emit(SyncEvent::NeedsResync {
            folder: folder.clone(),
            reason: reason.to_string(),
        });
    }
}
