//! Unified error types for the cache
//!
//! This module defines error types that:
//! - Are serializable so callers can forward them to a UI layer
//! - Keep transport failures distinct from local storage failures
//! - Map library errors to crate variants

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a mail transport client
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    #[error("Message {uid} not found in {folder}")]
    MessageNotFound { folder: String, uid: u32 },
}

/// Crate error type for the store, the sync engine and the query service
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum MailCacheError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache store is corrupted: {0}")]
    CorruptStore(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("A sync is already running for {0}")]
    SyncInProgress(String),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Sync manager is shutting down")]
    ShuttingDown,
}

impl From<std::io::Error> for MailCacheError {
    fn from(err: std::io::Error) -> Self {
        MailCacheError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for MailCacheError {
    fn from(err: toml::de::Error) -> Self {
        MailCacheError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for MailCacheError {
    fn from(err: serde_json::Error) -> Self {
        MailCacheError::Parse(err.to_string())
    }
}

impl From<rusqlite::Error> for MailCacheError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase
                ) =>
            {
                MailCacheError::CorruptStore(err.to_string())
            }
            _ => MailCacheError::Database(err.to_string()),
        }
    }
}

impl From<r2d2::Error> for MailCacheError {
    fn from(err: r2d2::Error) -> Self {
        MailCacheError::Database(format!("Failed to get connection: {}", err))
    }
}

impl MailCacheError {
    /// True for failures that came from the remote side rather than the local cache
    pub fn is_transport(&self) -> bool {
        matches!(self, MailCacheError::Transport(_))
    }
}

/// Result type alias using MailCacheError
pub type Result<T> = std::result::Result<T, MailCacheError>;
