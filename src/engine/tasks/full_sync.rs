use tokio::sync::watch;
use tracing::info;

use crate::engine::helpers::message_builder::build_message;
use crate::engine::{SyncEngine, SyncPlan};
use crate::types::error::Result;
use crate::types::{SyncMode, SyncReport};

/// Enumerate the folder and fetch every uid above the stored watermark.
///
/// For a fresh folder the watermark is 0, so every server uid is fetched.
/// A resumed full sync skips what earlier runs already committed. On
/// completion, cached rows that are no longer on the server are pruned.
pub async fn run_full_sync(
    engine: &SyncEngine,
    plan: &SyncPlan,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SyncReport> {
    let account = plan.folder.account.as_str();
    let folder = plan.folder.folder.as_str();
    let mut report = SyncReport::new(SyncMode::Full, plan.resumed);

    let total = engine
        .cancellable(shutdown, engine.transport.get_folder_status(folder))
        .await?;
    let mut server_uids = engine
        .cancellable(shutdown, engine.transport.enumerate(folder))
        .await?;
    server_uids.sort_unstable();
    server_uids.dedup();

    if !plan.metadata.full_sync_pending {
        engine.store.begin_full_sync(account, folder)?;
    }

    let watermark = plan.metadata.last_uid;
    let pending: Vec<u32> = server_uids
        .iter()
        .copied()
        .filter(|uid| *uid > watermark)
        .collect();

    info!(
        "{} messages on server, {} to fetch above uid {}",
        server_uids.len(),
        pending.len(),
        watermark
    );

    for chunk in pending.chunks(engine.config.batch_size) {
        let Some(&batch_max_uid) = chunk.last() else {
            continue;
        };

        let mut batch = Vec::with_capacity(chunk.len());
        for uid in chunk {
            match engine.fetch_one(folder, *uid, shutdown).await? {
                Some(remote) => batch.push(build_message(account, folder, &remote)),
                None => report.skipped += 1,
            }
        }

        report.fetched += batch.len() as u32;
        engine.commit(plan, &mut report, &batch, batch_max_uid, total)?;
    }

    report.pruned = engine.store.prune_missing(account, folder, &server_uids)?;

    let highest = server_uids.last().copied().unwrap_or(0);
    report.last_uid = engine.store.finish_full_sync(account, folder, highest, total)?;
    report.total_messages = total;

    Ok(report)
}
