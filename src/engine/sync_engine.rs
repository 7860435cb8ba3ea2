use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use super::helpers::StatusEmitter;
use super::tasks;
use crate::adapters::sqlite::{BatchOutcome, CacheStore};
use crate::adapters::transport::{MailTransport, RemoteMessage};
use crate::config::SyncSettings;
use crate::types::error::{MailCacheError, Result, TransportError};
use crate::types::{FolderHealth, FolderKey, FolderMetadata, Message, SyncMode, SyncReport};

/// Sync engine configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Messages per committed batch
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { batch_size: 100 }
    }
}

impl From<&SyncSettings> for SyncConfig {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
        }
    }
}

/// What the next sync of a folder will do, decided from local state only
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub folder: FolderKey,
    pub mode: SyncMode,
    /// A full sync that continues above an existing watermark
    pub resumed: bool,
    pub metadata: FolderMetadata,
    pub health: FolderHealth,
}

/// Drives one folder at a time from the transport into the cache store.
///
/// The engine itself holds no per-folder lock; callers serialize syncs of
/// the same folder (see `SyncManager`).
pub struct SyncEngine {
    pub(super) store: Arc<CacheStore>,
    pub(super) transport: Arc<dyn MailTransport>,
    pub(super) config: SyncConfig,
    pub(super) events: StatusEmitter,
}

impl SyncEngine {
    pub fn new(
        store: Arc<CacheStore>,
        transport: Arc<dyn MailTransport>,
        mut config: SyncConfig,
        events: StatusEmitter,
    ) -> Self {
        config.batch_size = config.batch_size.max(1);
        Self {
            store,
            transport,
            config,
            events,
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn events(&self) -> &StatusEmitter {
        &self.events
    }

    /// Decide the sync mode from stored metadata.
    ///
    /// `last_uid == 0` or an unfinished full sync means FULL, anything else
    /// INCREMENTAL. Inconsistent metadata is reported but does not block.
    pub fn plan(&self, folder: &FolderKey) -> Result<SyncPlan> {
        let metadata = self.store.get_folder_metadata(&folder.account, &folder.folder)?;
        let health = self.store.folder_health(&folder.account, &folder.folder)?;

        if let FolderHealth::NeedsResync(reason) = &health {
            self.events.emit_needs_resync(folder, reason);
        }

        let mode = if metadata.never_synced() || metadata.full_sync_pending {
            SyncMode::Full
        } else {
            SyncMode::Incremental
        };

        Ok(SyncPlan {
            folder: folder.clone(),
            mode,
            resumed: mode == SyncMode::Full && metadata.last_uid > 0,
            metadata,
            health,
        })
    }

    /// Run a planned sync until it completes, fails or `shutdown` flips to true.
    ///
    /// Whatever happens, the stored watermark only covers committed batches.
    pub async fn execute(
        &self,
        plan: &SyncPlan,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<SyncReport> {
        let span = info_span!(
            "sync",
            run_id = %Uuid::new_v4(),
            folder = %plan.folder,
            mode = %plan.mode,
        );

        async {
            info!(
                "Starting {} sync (watermark {}, resumed: {})",
                plan.mode, plan.metadata.last_uid, plan.resumed
            );

            let result = match plan.mode {
                SyncMode::Full => tasks::run_full_sync(self, plan, &mut shutdown).await,
                SyncMode::Incremental => tasks::run_incremental_sync(self, plan, &mut shutdown).await,
            };

            match &result {
                Ok(report) => info!(
                    "Sync complete: {} fetched, {} new, {} updated, {} pruned, last_uid {}",
                    report.fetched, report.inserted, report.updated, report.pruned, report.last_uid
                ),
                Err(MailCacheError::Cancelled) => info!("Sync cancelled"),
                Err(e) => error!("Sync failed: {}", e),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Plan and execute in one step
    pub async fn sync_folder(
        &self,
        folder: &FolderKey,
        shutdown: watch::Receiver<bool>,
    ) -> Result<SyncReport> {
        let plan = self.plan(folder)?;
        self.execute(&plan, shutdown).await
    }

    // ========== Helpers shared by the sync tasks ==========

    /// Await a transport call unless shutdown is requested first
    pub(super) async fn cancellable<T, F>(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        call: F,
    ) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, TransportError>>,
    {
        if *shutdown.borrow() {
            return Err(MailCacheError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = shutdown_requested(shutdown) => Err(MailCacheError::Cancelled),
            result = call => result.map_err(MailCacheError::from),
        }
    }

    /// Fetch one uid; `None` when it disappeared from the server since enumeration
    pub(super) async fn fetch_one(
        &self,
        folder: &str,
        uid: u32,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<RemoteMessage>> {
        match self
            .cancellable(shutdown, self.transport.fetch(folder, uid))
            .await
        {
            Ok(message) => Ok(Some(message)),
            Err(MailCacheError::Transport(TransportError::MessageNotFound { .. })) => {
                debug!("uid {} vanished before fetch, skipping", uid);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Commit one batch and advance the watermark to `batch_max_uid`
    pub(super) fn commit(
        &self,
        plan: &SyncPlan,
        report: &mut SyncReport,
        batch: &[Message],
        batch_max_uid: u32,
        total_messages: u32,
    ) -> Result<()> {
        let outcome = self.store.commit_batch(
            &plan.folder.account,
            &plan.folder.folder,
            batch,
            batch_max_uid,
            total_messages,
        )?;

        absorb(report, &outcome);
        debug!(
            "Committed batch {} ({} messages) up to uid {}",
            report.batches,
            batch.len(),
            outcome.last_uid
        );
        self.events
            .emit_batch(&plan.folder, outcome.committed(), outcome.last_uid, total_messages);
        Ok(())
    }
}

fn absorb(report: &mut SyncReport, outcome: &BatchOutcome) {
    report.inserted += outcome.inserted;
    report.updated += outcome.updated;
    report.unchanged += outcome.unchanged;
    report.resurfaced += outcome.resurfaced;
    report.batches += 1;
    report.last_uid = outcome.last_uid;
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.map(|_| ()).is_err();
    if closed {
        // Sender gone without a stop request: never cancel
        std::future::pending::<()>().await;
    }
}
