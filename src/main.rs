//! mailcache-status - print the sync state of every configured folder
//!
//! Reads the cache store directly; no network access. Config is taken from
//! `MAILCACHE_CONFIG` or the user config directory.

use std::process::ExitCode;

use mailcache::config::{self, AppConfig};
use mailcache::types::{FolderHealth, FolderKey};
use mailcache::{CacheStore, MailCacheError};
use tracing::error;

fn main() -> ExitCode {
    mailcache::init_tracing();

    match run() {
        Ok(healthy) if healthy => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(2),
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns false if any folder needs a resync
fn run() -> Result<bool, MailCacheError> {
    config::init_config()?;
    let config: AppConfig = config::get_config()?;
    let db_path = config.db_path();

    if !db_path.exists() {
        println!("No cache store at {}", db_path.display());
        return Ok(true);
    }

    let store = CacheStore::open(&db_path, config.cache.pool_size)?;
    println!("Cache store: {}", db_path.display());

    let mut folders = config.folder_keys();
    for meta in store.list_folder_metadata()? {
        let key = FolderKey::new(&meta.account, &meta.folder);
        if !folders.contains(&key) {
            folders.push(key);
        }
    }

    let mut all_healthy = true;
    for FolderKey { account, folder } in &folders {
        let meta = store.get_folder_metadata(account, folder)?;
        let count = store.count(account, folder)?;
        let health = store.folder_health(account, folder)?;
        let last_sync = meta
            .last_sync_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());

        println!(
            "{}/{}: {} cached, last_uid={}, total_messages={}, last_sync={}{}",
            account,
            folder,
            count,
            meta.last_uid,
            meta.total_messages,
            last_sync,
            if meta.full_sync_pending { ", full sync pending" } else { "" },
        );

        if let FolderHealth::NeedsResync(reason) = health {
            all_healthy = false;
            println!("  needs resync: {}", reason);
        }
    }

    Ok(all_healthy)
}
