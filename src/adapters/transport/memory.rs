use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{MailTransport, RemoteMessage};
use crate::types::error::TransportError;

/// In-process mailbox used by tests and demos.
///
/// Supports failure injection (`fail_after`), per-fetch latency and keeps a
/// log of every uid it handed out.
#[derive(Default)]
pub struct MemoryTransport {
    folders: Mutex<HashMap<String, BTreeMap<u32, RemoteMessage>>>,
    /// Successful fetches left before every fetch fails
    fetch_budget: Mutex<Option<usize>>,
    latency: Mutex<Option<Duration>>,
    fetch_log: Mutex<Vec<u32>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, folder: &str, message: RemoteMessage) {
        lock(&self.folders)
            .entry(folder.to_string())
            .or_default()
            .insert(message.uid, message);
    }

    pub fn remove(&self, folder: &str, uid: u32) -> Option<RemoteMessage> {
        lock(&self.folders).get_mut(folder)?.remove(&uid)
    }

    /// Replace the flags of a stored message; returns false if it does not exist
    pub fn set_flags(&self, folder: &str, uid: u32, flags: &[&str]) -> bool {
        match lock(&self.folders).get_mut(folder).and_then(|f| f.get_mut(&uid)) {
            Some(message) => {
                message.flags = flags.iter().map(|f| f.to_string()).collect();
                true
            }
            None => false,
        }
    }

    /// Let `successes` more messages through, then fail every fetch
    pub fn fail_after(&self, successes: usize) {
        *lock(&self.fetch_budget) = Some(successes);
    }

    /// Stop injecting failures
    pub fn heal(&self) {
        *lock(&self.fetch_budget) = None;
    }

    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = Some(latency);
    }

    /// Uids returned by `fetch` and `fetch_since`, in order
    pub fn fetch_log(&self) -> Vec<u32> {
        lock(&self.fetch_log).clone()
    }

    pub fn clear_fetch_log(&self) {
        lock(&self.fetch_log).clear();
    }

    async fn delay(&self) {
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_budget(&self) -> Result<(), TransportError> {
        let mut budget = lock(&self.fetch_budget);
        match budget.as_mut() {
            Some(0) => Err(TransportError::Network("connection reset by peer".into())),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn folder_snapshot(&self, folder: &str) -> Result<BTreeMap<u32, RemoteMessage>, TransportError> {
        lock(&self.folders)
            .get(folder)
            .cloned()
            .ok_or_else(|| TransportError::FolderNotFound(folder.to_string()))
    }
}

#[async_trait]
impl MailTransport for MemoryTransport {
    async fn enumerate(&self, folder: &str) -> Result<Vec<u32>, TransportError> {
        Ok(self.folder_snapshot(folder)?.into_keys().collect())
    }

    async fn fetch(&self, folder: &str, uid: u32) -> Result<RemoteMessage, TransportError> {
        self.delay().await;
        self.take_budget()?;

        let message = lock(&self.folders)
            .get(folder)
            .ok_or_else(|| TransportError::FolderNotFound(folder.to_string()))?
            .get(&uid)
            .cloned()
            .ok_or_else(|| TransportError::MessageNotFound {
                folder: folder.to_string(),
                uid,
            })?;

        lock(&self.fetch_log).push(uid);
        Ok(message)
    }

    async fn fetch_since(
        &self,
        folder: &str,
        last_uid: u32,
    ) -> Result<Vec<RemoteMessage>, TransportError> {
        let snapshot = self.folder_snapshot(folder)?;
        let mut messages = Vec::new();

        for (uid, message) in snapshot.range(last_uid.saturating_add(1)..) {
            self.delay().await;
            self.take_budget()?;
            lock(&self.fetch_log).push(*uid);
            messages.push(message.clone());
        }

        Ok(messages)
    }

    async fn get_folder_status(&self, folder: &str) -> Result<u32, TransportError> {
        Ok(self.folder_snapshot(folder)?.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn transport_with(uids: &[u32]) -> MemoryTransport {
        let transport = MemoryTransport::new();
        for uid in uids {
            transport.insert(
                "INBOX",
                RemoteMessage::compose(*uid, "alice@example.com", "hi", Utc::now(), "body"),
            );
        }
        transport
    }

    #[tokio::test]
    async fn test_enumerate_is_ascending() {
        let transport = transport_with(&[9, 3, 5]);
        assert_eq!(transport.enumerate("INBOX").await.unwrap(), vec![3, 5, 9]);
        assert_eq!(transport.get_folder_status("INBOX").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_fetch_since_is_exclusive() {
        let transport = transport_with(&[1, 2, 3, 4]);
        let uids: Vec<u32> = transport
            .fetch_since("INBOX", 2)
            .await
            .unwrap()
            .iter()
            .map(|m| m.uid)
            .collect();
        assert_eq!(uids, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let transport = transport_with(&[1, 2, 3]);
        transport.fail_after(2);

        assert!(transport.fetch("INBOX", 1).await.is_ok());
        assert!(transport.fetch("INBOX", 2).await.is_ok());
        assert!(matches!(
            transport.fetch("INBOX", 3).await,
            Err(TransportError::Network(_))
        ));

        transport.heal();
        assert!(transport.fetch("INBOX", 3).await.is_ok());
        assert_eq!(transport.fetch_log(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_missing_folder_and_uid() {
        let transport = transport_with(&[1]);
        assert!(matches!(
            transport.enumerate("Archive").await,
            Err(TransportError::FolderNotFound(_))
        ));
        assert!(matches!(
            transport.fetch("INBOX", 7).await,
            Err(TransportError::MessageNotFound { uid: 7, .. })
        ));
    }
}
