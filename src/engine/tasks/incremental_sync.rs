use tokio::sync::watch;
use tracing::{debug, info};

use crate::engine::helpers::message_builder::prepare_messages;
use crate::engine::{SyncEngine, SyncPlan};
use crate::types::error::{MailCacheError, Result};
use crate::types::{SyncMode, SyncReport};

/// Fetch only messages above the watermark and commit them in uid order.
///
/// New mail arrives through a single `fetch_since` call, so nothing is
/// committed until the whole range is in memory. A transport failure or a
/// shutdown during that call leaves the watermark where it was and the next
/// run downloads the range again. Once fetched, the range is committed in
/// `batch_size` chunks and shutdown is honored between chunks.
pub async fn run_incremental_sync(
    engine: &SyncEngine,
    plan: &SyncPlan,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SyncReport> {
    let account = plan.folder.account.as_str();
    let folder = plan.folder.folder.as_str();
    let watermark = plan.metadata.last_uid;
    let mut report = SyncReport::new(SyncMode::Incremental, false);

    let total = engine
        .cancellable(shutdown, engine.transport.get_folder_status(folder))
        .await?;
    let mut fetched = engine
        .cancellable(shutdown, engine.transport.fetch_since(folder, watermark))
        .await?;

    // "N:*" style ranges can include the highest uid even when it is below N
    fetched.retain(|m| m.uid > watermark);
    fetched.sort_by_key(|m| m.uid);
    fetched.dedup_by_key(|m| m.uid);

    if fetched.is_empty() {
        debug!("No messages above uid {}", watermark);
        engine.store.set_folder_metadata(account, folder, watermark, total)?;
        report.last_uid = watermark;
        report.total_messages = total;
        return Ok(report);
    }

    info!("Found {} new messages above uid {}", fetched.len(), watermark);

    for chunk in fetched.chunks(engine.config.batch_size) {
        if *shutdown.borrow() {
            return Err(MailCacheError::Cancelled);
        }
        let Some(batch_max_uid) = chunk.last().map(|m| m.uid) else {
            continue;
        };

        let batch = prepare_messages(account, folder, chunk);
        report.fetched += batch.len() as u32;
        engine.commit(plan, &mut report, &batch, batch_max_uid, total)?;
    }

    report.total_messages = total;
    Ok(report)
}
