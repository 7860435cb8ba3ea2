//! Folder sync engine
//!
//! ## Module Organization
//!
//! - `sync_engine`: mode decision, cancellation and batch commits
//! - `tasks/`: the full and incremental sync algorithms
//! - `helpers/`: message building and event fan-out
//!
//! Every batch is committed together with the watermark it covers, so an
//! interrupted sync resumes strictly above the last committed uid.

pub mod helpers;
mod sync_engine;
mod tasks;

pub use sync_engine::{SyncConfig, SyncEngine, SyncPlan};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::CacheStore;
    use crate::adapters::transport::{MailTransport, MemoryTransport, RemoteMessage};
    use crate::types::error::{MailCacheError, TransportError};
    use crate::types::{FolderKey, SyncMode};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use tokio::sync::watch;

    const ACCOUNT: &str = "me@example.com";
    const FOLDER: &str = "INBOX";

    fn key() -> FolderKey {
        FolderKey::new(ACCOUNT, FOLDER)
    }

    fn remote(uid: u32) -> RemoteMessage {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(uid as i64);
        RemoteMessage::compose(uid, "alice@example.com", &format!("Message {}", uid), date, "hello")
    }

    fn setup(uids: impl IntoIterator<Item = u32>, batch_size: usize) -> (Arc<MemoryTransport>, Arc<CacheStore>, SyncEngine) {
        let transport = Arc::new(MemoryTransport::new());
        for uid in uids {
            transport.insert(FOLDER, remote(uid));
        }
        let store = Arc::new(CacheStore::in_memory().expect("Failed to create store"));
        let engine = SyncEngine::new(
            store.clone(),
            transport.clone() as Arc<dyn MailTransport>,
            SyncConfig { batch_size },
            helpers::StatusEmitter::new(),
        );
        (transport, store, engine)
    }

    #[tokio::test]
    async fn test_plan_mode_decision() {
        let (_transport, store, engine) = setup(1..=3, 10);
        assert_eq!(engine.plan(&key()).unwrap().mode, SyncMode::Full);

        store.set_folder_metadata(ACCOUNT, FOLDER, 3, 3).unwrap();
        assert_eq!(engine.plan(&key()).unwrap().mode, SyncMode::Incremental);

        store.begin_full_sync(ACCOUNT, FOLDER).unwrap();
        let plan = engine.plan(&key()).unwrap();
        assert_eq!(plan.mode, SyncMode::Full);
        assert!(plan.resumed);
    }

    #[tokio::test]
    async fn test_full_then_incremental() {
        let (transport, store, engine) = setup(1..=25, 10);
        let (_tx, rx) = watch::channel(false);

        let report = engine.sync_folder(&key(), rx.clone()).await.unwrap();
        assert_eq!(report.mode, SyncMode::Full);
        assert_eq!(report.inserted, 25);
        assert_eq!(report.batches, 3);
        assert_eq!(store.get_folder_metadata(ACCOUNT, FOLDER).unwrap().watermark(), (25, 25));

        transport.clear_fetch_log();
        transport.insert(FOLDER, remote(26));
        transport.insert(FOLDER, remote(27));

        let report = engine.sync_folder(&key(), rx).await.unwrap();
        assert_eq!(report.mode, SyncMode::Incremental);
        assert_eq!(report.inserted, 2);
        assert_eq!(transport.fetch_log(), vec![26, 27]);
        assert_eq!(store.get_folder_metadata(ACCOUNT, FOLDER).unwrap().watermark(), (27, 27));
        assert_eq!(store.count(ACCOUNT, FOLDER).unwrap(), 27);
    }

    #[tokio::test]
    async fn test_incremental_without_news_refreshes_total() {
        let (transport, store, engine) = setup(1..=4, 10);
        let (_tx, rx) = watch::channel(false);
        engine.sync_folder(&key(), rx.clone()).await.unwrap();

        transport.remove(FOLDER, 2);
        let report = engine.sync_folder(&key(), rx).await.unwrap();
        assert_eq!(report.fetched, 0);
        assert_eq!(store.get_folder_metadata(ACCOUNT, FOLDER).unwrap().watermark(), (4, 3));
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_committed_batches() {
        let (transport, store, engine) = setup(1..=30, 10);
        let (_tx, rx) = watch::channel(false);
        transport.fail_after(15);

        let err = engine.sync_folder(&key(), rx.clone()).await.unwrap_err();
        assert!(matches!(err, MailCacheError::Transport(TransportError::Network(_))));

        let meta = store.get_folder_metadata(ACCOUNT, FOLDER).unwrap();
        assert_eq!(meta.last_uid, 10);
        assert!(meta.full_sync_pending);
        assert_eq!(store.count(ACCOUNT, FOLDER).unwrap(), 10);

        transport.heal();
        transport.clear_fetch_log();
        let report = engine.sync_folder(&key(), rx).await.unwrap();
        assert!(report.resumed);
        assert!(transport.fetch_log().iter().all(|uid| *uid > 10));
        assert_eq!(store.count(ACCOUNT, FOLDER).unwrap(), 30);
        assert_eq!(store.get_folder_metadata(ACCOUNT, FOLDER).unwrap().watermark(), (30, 30));
    }

    #[tokio::test]
    async fn test_incremental_failure_keeps_previous_watermark() {
        let (transport, store, engine) = setup(1..=20, 5);
        let (_tx, rx) = watch::channel(false);
        engine.sync_folder(&key(), rx.clone()).await.unwrap();

        for uid in 21..=32 {
            transport.insert(FOLDER, remote(uid));
        }
        transport.fail_after(7);

        let err = engine.sync_folder(&key(), rx.clone()).await.unwrap_err();
        assert!(matches!(err, MailCacheError::Transport(TransportError::Network(_))));
        assert_eq!(store.get_folder_metadata(ACCOUNT, FOLDER).unwrap().watermark(), (20, 20));
        assert_eq!(store.count(ACCOUNT, FOLDER).unwrap(), 20);

        transport.heal();
        let report = engine.sync_folder(&key(), rx).await.unwrap();
        assert_eq!(report.mode, SyncMode::Incremental);
        assert_eq!(report.inserted, 12);
        assert_eq!(store.get_folder_metadata(ACCOUNT, FOLDER).unwrap().watermark(), (32, 32));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let (transport, store, engine) = setup(1..=5, 2);
        let (_tx, rx) = watch::channel(true);

        let err = engine.sync_folder(&key(), rx).await.unwrap_err();
        assert!(matches!(err, MailCacheError::Cancelled));
        assert!(transport.fetch_log().is_empty());
        assert_eq!(store.get_folder_metadata(ACCOUNT, FOLDER).unwrap().last_uid, 0);
    }

    #[tokio::test]
    async fn test_full_sync_prunes_renumbered_messages() {
        let (transport, store, engine) = setup(1..=3, 10);
        let (_tx, rx) = watch::channel(false);
        engine.sync_folder(&key(), rx.clone()).await.unwrap();

        // Server renumbers the folder: same messages, new uids
        for uid in 1..=3 {
            let mut moved = transport.remove(FOLDER, uid).unwrap();
            moved.uid = uid + 100;
            transport.insert(FOLDER, moved);
        }
        store.reset_folder_metadata(ACCOUNT, FOLDER).unwrap();

        let report = engine.sync_folder(&key(), rx).await.unwrap();
        assert_eq!(report.resurfaced, 3);
        assert_eq!(report.pruned, 3);
        assert_eq!(store.local_uids(ACCOUNT, FOLDER).unwrap(), vec![101, 102, 103]);
        assert_eq!(store.get_folder_metadata(ACCOUNT, FOLDER).unwrap().watermark(), (103, 3));
    }

    #[tokio::test]
    async fn test_flag_changes_do_not_move_watermark() {
        let (transport, store, engine) = setup(1..=3, 10);
        let (_tx, rx) = watch::channel(false);
        engine.sync_folder(&key(), rx.clone()).await.unwrap();

        transport.set_flags(FOLDER, 2, &["\\Seen"]);
        store.reset_folder_metadata(ACCOUNT, FOLDER).unwrap();
        let report = engine.sync_folder(&key(), rx).await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.unchanged, 2);
        assert!(store.get_message(ACCOUNT, FOLDER, 2).unwrap().unwrap().is_seen());
        assert_eq!(store.get_folder_metadata(ACCOUNT, FOLDER).unwrap().last_uid, 3);
    }
}
