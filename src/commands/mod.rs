//! Operator commands
//!
//! Programmatic control surface for whatever drives the cache (a UI, a
//! scheduler, tests). Commands are thin wrappers over the sync manager.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::state::SyncManager;
use crate::types::error::Result;
use crate::types::TriggerOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    TriggerSync { account: String, folder: String },
    ResetMetadata { account: String, folder: String },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    Sync(TriggerOutcome),
    MetadataReset,
    ShutDown,
}

pub async fn trigger_sync(manager: &SyncManager, account: &str, folder: &str) -> Result<TriggerOutcome> {
    manager.trigger_sync(account, folder).await
}

pub async fn reset_metadata(manager: &SyncManager, account: &str, folder: &str) -> Result<()> {
    info!("Operator reset of folder metadata for {}/{}", account, folder);
    manager.reset_metadata(account, folder).await
}

pub async fn shutdown(manager: &SyncManager) {
    manager.shutdown().await
}

pub async fn dispatch(manager: &SyncManager, command: Command) -> Result<CommandOutcome> {
    match command {
        Command::TriggerSync { account, folder } => {
            trigger_sync(manager, &account, &folder).await.map(CommandOutcome::Sync)
        }
        Command::ResetMetadata { account, folder } => {
            reset_metadata(manager, &account, &folder).await?;
            Ok(CommandOutcome::MetadataReset)
        }
        Command::Shutdown => {
            shutdown(manager).await;
            Ok(CommandOutcome::ShutDown)
        }
    }
}
