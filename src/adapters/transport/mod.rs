//! Mail transport seam
//!
//! The sync engine only talks to the remote mailbox through [`MailTransport`].
//! Protocol clients (IMAP, JMAP, ...) live outside this crate and implement it.

mod memory;

pub use memory::MemoryTransport;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::error::TransportError;

/// A message as delivered by the remote server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMessage {
    pub uid: u32,
    pub flags: Vec<String>,
    /// Server-side arrival time, used when the Date header is missing or broken
    pub internal_date: Option<DateTime<Utc>>,
    /// Full RFC 5322 source
    pub raw: Vec<u8>,
}

impl RemoteMessage {
    pub fn new(uid: u32, raw: impl Into<Vec<u8>>) -> Self {
        Self {
            uid,
            flags: Vec::new(),
            internal_date: None,
            raw: raw.into(),
        }
    }

    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_internal_date(mut self, date: DateTime<Utc>) -> Self {
        self.internal_date = Some(date);
        self
    }

    /// Build a simple plain-text message
    pub fn compose(uid: u32, from: &str, subject: &str, date: DateTime<Utc>, body: &str) -> Self {
        let raw = format!(
            "Message-ID: <{uid}.{ts}@mailcache.test>\r\n\
             From: {from}\r\n\
             To: me@example.com\r\n\
             Subject: {subject}\r\n\
             Date: {date}\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             \r\n\
             {body}\r\n",
            ts = date.timestamp(),
            date = date.to_rfc2822(),
        );
        Self::new(uid, raw).with_internal_date(date)
    }
}

/// Client for one remote mailbox account
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// All uids currently in the folder, ascending
    async fn enumerate(&self, folder: &str) -> Result<Vec<u32>, TransportError>;

    async fn fetch(&self, folder: &str, uid: u32) -> Result<RemoteMessage, TransportError>;

    /// Messages with uid strictly greater than `last_uid`
    async fn fetch_since(
        &self,
        folder: &str,
        last_uid: u32,
    ) -> Result<Vec<RemoteMessage>, TransportError>;

    /// Server-reported message count
    async fn get_folder_status(&self, folder: &str) -> Result<u32, TransportError>;
}
