use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;
use tracing::info;

use crate::types::error::MailCacheError;
use crate::types::FolderKey;

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "MAILCACHE_CONFIG";

/// Global configuration instance
static CONFIG: OnceCell<RwLock<AppConfig>> = OnceCell::new();

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub sync: SyncSettings,

    /// Accounts and the folders to keep cached
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// Cache store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// SQLite database file (default: <cache dir>/mailcache/emails.db)
    pub db_path: Option<PathBuf>,

    /// Maximum pooled connections shared by the sync writer and readers
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

/// Sync engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Messages committed per transaction
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Seconds between scheduled refreshes of every configured folder
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

/// Account configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Email address, also the account key in the cache
    pub email: String,

    #[serde(default = "default_folders")]
    pub folders: Vec<String>,
}

fn default_pool_size() -> u32 {
    8
}

fn default_batch_size() -> usize {
    100
}

fn default_refresh_interval_secs() -> u64 {
    300
}

fn default_folders() -> Vec<String> {
    vec!["INBOX".to_string()]
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            pool_size: default_pool_size(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

impl SyncSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl AppConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self, MailCacheError> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| MailCacheError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, MailCacheError> {
        info!("Loading configuration from: {:?}", path);
        let content = fs::read_to_string(path)
            .map_err(|e| MailCacheError::Config(format!("Failed to read config: {}", e)))?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), MailCacheError> {
        if self.sync.batch_size == 0 {
            return Err(MailCacheError::Config("sync.batch_size must be greater than 0".into()));
        }
        if self.sync.refresh_interval_secs == 0 {
            return Err(MailCacheError::Config(
                "sync.refresh_interval_secs must be greater than 0".into(),
            ));
        }
        if self.cache.pool_size == 0 {
            return Err(MailCacheError::Config("cache.pool_size must be greater than 0".into()));
        }
        for account in &self.accounts {
            if account.email.trim().is_empty() {
                return Err(MailCacheError::Config("account email must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Every configured (account, folder) pair
    pub fn folder_keys(&self) -> Vec<FolderKey> {
        self.accounts
            .iter()
            .flat_map(|account| {
                account
                    .folders
                    .iter()
                    .map(move |folder| FolderKey::new(&account.email, folder))
            })
            .collect()
    }

    /// Database path, falling back to the user cache directory
    pub fn db_path(&self) -> PathBuf {
        self.cache.db_path.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("mailcache")
                .join("emails.db")
        })
    }
}

/// Get default config paths
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        paths.push(PathBuf::from(path));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("mailcache").join("config.toml"));
    }

    paths
}

/// Initialize configuration from default paths
pub fn init_config() -> Result<(), MailCacheError> {
    for path in default_config_paths() {
        if path.exists() {
            info!("Found config at: {:?}", path);
            return init_config_from_path(&path);
        }
    }

    info!("No config file found, using defaults");
    set_config(AppConfig::default())
}

/// Initialize configuration from a specific path
pub fn init_config_from_path(path: &Path) -> Result<(), MailCacheError> {
    set_config(AppConfig::load(path)?)
}

/// Set the global configuration
fn set_config(config: AppConfig) -> Result<(), MailCacheError> {
    match CONFIG.get() {
        Some(lock) => {
            let mut guard = lock
                .write()
                .map_err(|e| MailCacheError::Config(format!("Failed to lock config: {}", e)))?;
            *guard = config;
        }
        None => {
            CONFIG.set(RwLock::new(config)).ok();
        }
    }
    Ok(())
}

/// Snapshot of the global configuration
pub fn get_config() -> Result<AppConfig, MailCacheError> {
    let lock = CONFIG
        .get()
        .ok_or_else(|| MailCacheError::Config("Configuration not initialized".into()))?;
    let guard = lock
        .read()
        .map_err(|e| MailCacheError::Config(format!("Failed to lock config: {}", e)))?;
    Ok(guard.clone())
}
