//! Sync scheduling state
//!
//! Owns one sync engine per account and one lock per folder. A trigger for
//! a folder that is already syncing returns immediately instead of queueing.
//! `start_refresh` runs the periodic trigger loop.

use flume::Receiver;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::adapters::sqlite::CacheStore;
use crate::adapters::transport::MailTransport;
use crate::engine::helpers::StatusEmitter;
use crate::engine::{SyncConfig, SyncEngine};
use crate::types::error::{MailCacheError, Result};
use crate::types::{FolderHealth, FolderKey, SyncEvent, SyncState, TriggerOutcome};

struct FolderSlot {
    /// Held for the whole duration of a sync or a reset
    lock: Arc<Mutex<()>>,
    state: RwLock<SyncState>,
}

impl FolderSlot {
    fn new() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            state: RwLock::new(SyncState::Idle),
        }
    }
}

/// Sync manager - one engine per account, one lock per folder
pub struct SyncManager {
    store: Arc<CacheStore>,
    config: SyncConfig,
    events: StatusEmitter,
    engines: RwLock<HashMap<String, Arc<SyncEngine>>>,
    folders: RwLock<HashMap<FolderKey, Arc<FolderSlot>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl SyncManager {
    pub fn new(store: Arc<CacheStore>, config: SyncConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            config,
            events: StatusEmitter::new(),
            engines: RwLock::new(HashMap::new()),
            folders: RwLock::new(HashMap::new()),
            shutdown_tx,
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Receive state changes, batch progress and completion events
    pub fn subscribe(&self) -> Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Attach the transport used for every folder of `account`
    pub async fn register_account(&self, account: &str, transport: Arc<dyn MailTransport>) {
        info!("Registering sync engine for account: {}", account);
        let engine = SyncEngine::new(
            self.store.clone(),
            transport,
            self.config.clone(),
            self.events.clone(),
        );
        self.engines
            .write()
            .await
            .insert(account.to_string(), Arc::new(engine));
    }

    pub async fn remove_account(&self, account: &str) -> bool {
        self.engines.write().await.remove(account).is_some()
    }

    async fn engine(&self, account: &str) -> Result<Arc<SyncEngine>> {
        self.engines
            .read()
            .await
            .get(account)
            .cloned()
            .ok_or_else(|| MailCacheError::AccountNotFound(account.to_string()))
    }

    async fn slot(&self, key: &FolderKey) -> Arc<FolderSlot> {
        {
            let folders = self.folders.read().await;
            if let Some(slot) = folders.get(key) {
                return slot.clone();
            }
        }

        self.folders
            .write()
            .await
            .entry(key.clone())
            .or_insert_with(|| Arc::new(FolderSlot::new()))
            .clone()
    }

    async fn set_state(&self, slot: &FolderSlot, key: &FolderKey, state: SyncState) {
        *slot.state.write().await = state.clone();
        self.events.emit_state(key, state);
    }

    /// Current sync state of a folder
    pub async fn status(&self, account: &str, folder: &str) -> SyncState {
        let key = FolderKey::new(account, folder);
        let slot = self.folders.read().await.get(&key).cloned();
        match slot {
            Some(slot) => slot.state.read().await.clone(),
            None => SyncState::Idle,
        }
    }

    pub fn folder_health(&self, account: &str, folder: &str) -> Result<FolderHealth> {
        self.store.folder_health(account, folder)
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Sync one folder now.
    ///
    /// Returns `AlreadyRunning` without doing anything if that folder is
    /// already syncing. A transport error is returned to the caller after
    /// the folder state has been set to `Error`.
    pub async fn trigger_sync(&self, account: &str, folder: &str) -> Result<TriggerOutcome> {
        if self.is_shutting_down() {
            return Err(MailCacheError::ShuttingDown);
        }

        let engine = self.engine(account).await?;
        let key = FolderKey::new(account, folder);
        let slot = self.slot(&key).await;

        let _guard = match slot.lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Sync already running for {}, trigger coalesced", key);
                return Ok(TriggerOutcome::AlreadyRunning);
            }
        };

        let plan = match engine.plan(&key) {
            Ok(plan) => plan,
            Err(e) => {
                self.set_state(&slot, &key, SyncState::Error(e.to_string())).await;
                return Err(e);
            }
        };

        self.set_state(&slot, &key, SyncState::Syncing(plan.mode)).await;

        match engine.execute(&plan, self.shutdown_tx.subscribe()).await {
            Ok(report) => {
                self.events.emit_completed(&key, &report);
                self.set_state(&slot, &key, SyncState::Idle).await;
                Ok(TriggerOutcome::Completed(report))
            }
            Err(MailCacheError::Cancelled) => match self.store.get_folder_metadata(account, folder) {
                Ok(metadata) => {
                    self.set_state(&slot, &key, SyncState::Idle).await;
                    Ok(TriggerOutcome::Cancelled {
                        last_uid: metadata.last_uid,
                    })
                }
                Err(e) => {
                    self.set_state(&slot, &key, SyncState::Error(e.to_string())).await;
                    Err(e)
                }
            },
            Err(e) => {
                warn!("Sync of {} failed, watermark kept at last commit: {}", key, e);
                self.set_state(&slot, &key, SyncState::Error(e.to_string())).await;
                Err(e)
            }
        }
    }

    /// Same as `trigger_sync`, on a spawned task
    pub fn trigger_sync_background(
        self: &Arc<Self>,
        account: &str,
        folder: &str,
    ) -> JoinHandle<Result<TriggerOutcome>> {
        let manager = Arc::clone(self);
        let account = account.to_string();
        let folder = folder.to_string();
        tokio::spawn(async move { manager.trigger_sync(&account, &folder).await })
    }

    /// Trigger every folder in `folders` now and then once per `every`,
    /// until shutdown.
    ///
    /// Folders sync in parallel. A tick that finds a folder still syncing is
    /// coalesced into the running sync.
    pub fn start_refresh(
        self: &Arc<Self>,
        folders: Vec<FolderKey>,
        every: Duration,
    ) -> Result<JoinHandle<()>> {
        if every.is_zero() {
            return Err(MailCacheError::InvalidInput("refresh interval must be greater than 0".into()));
        }
        if self.is_shutting_down() {
            return Err(MailCacheError::ShuttingDown);
        }

        info!("Refreshing {} folders every {:?}", folders.len(), every);
        let manager = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();

        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.wait_for(|stop| *stop) => break,
                    _ = ticker.tick() => {}
                }

                for key in &folders {
                    let manager = Arc::clone(&manager);
                    let key = key.clone();
                    tokio::spawn(async move { manager.refresh_folder(&key).await });
                }
            }
            info!("Refresh loop stopped");
        }))
    }

    async fn refresh_folder(&self, key: &FolderKey) {
        match self.trigger_sync(&key.account, &key.folder).await {
            Ok(TriggerOutcome::Completed(report)) => {
                debug!("Refreshed {}: {} new", key, report.inserted)
            }
            Ok(TriggerOutcome::AlreadyRunning) => debug!("Refresh of {} coalesced", key),
            Ok(TriggerOutcome::Cancelled { .. }) | Err(MailCacheError::ShuttingDown) => {}
            Err(e) => warn!("Scheduled refresh of {} failed: {}", key, e),
        }
    }

    /// Force the next sync of a folder to be FULL.
    ///
    /// Refused while that folder is syncing, since the running sync would
    /// keep advancing the watermark it is about to clear.
    pub async fn reset_metadata(&self, account: &str, folder: &str) -> Result<()> {
        let key = FolderKey::new(account, folder);
        let slot = self.slot(&key).await;
        let _guard = slot
            .lock
            .clone()
            .try_lock_owned()
            .map_err(|_| MailCacheError::SyncInProgress(key.to_string()))?;

        self.store.reset_folder_metadata(account, folder)?;
        self.set_state(&slot, &key, SyncState::Idle).await;
        Ok(())
    }

    /// Stop all syncs at the next fetch and wait until every folder is idle
    pub async fn shutdown(&self) {
        info!("Shutting down sync manager");
        self.shutdown_tx.send_replace(true);

        let slots: Vec<Arc<FolderSlot>> = self.folders.read().await.values().cloned().collect();
        for slot in slots {
            let _idle = slot.lock.lock().await;
        }
        info!("All folder syncs stopped");
    }
}
