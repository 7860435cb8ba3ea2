use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// IMAP-style flag marking a message as read
pub const SEEN_FLAG: &str = "\\Seen";

/// A single mailbox address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub name: Option<String>,
    pub address: String,
}

impl EmailAddress {
    pub fn new(name: Option<&str>, address: &str) -> Self {
        Self {
            name: name.map(str::to_string).filter(|n| !n.is_empty()),
            address: address.to_string(),
        }
    }
}

/// File attached to a cached message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: Option<String>,
    pub content_type: String,
    #[serde(skip)]
    pub data: Vec<u8>,
    pub size: usize,
}

impl Attachment {
    pub fn new(filename: Option<String>, content_type: String, data: Vec<u8>) -> Self {
        let size = data.len();
        Self {
            filename,
            content_type,
            data,
            size,
        }
    }
}

/// A fully cached message, identified by (account, folder, uid)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub account: String,
    pub folder: String,
    pub uid: u32,
    pub message_id: Option<String>,
    pub subject: String,
    pub from: Vec<EmailAddress>,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub received_at: DateTime<Utc>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    /// Sorted, deduplicated flag set
    pub flags: Vec<String>,
    /// Raw header section as received, kept as a fallback for fields
    /// that could not be parsed
    pub raw_headers: String,
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Minimal message with empty content, mostly useful for building fixtures
    pub fn new(account: &str, folder: &str, uid: u32, received_at: DateTime<Utc>) -> Self {
        Self {
            account: account.to_string(),
            folder: folder.to_string(),
            uid,
            message_id: None,
            subject: String::new(),
            from: Vec::new(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            received_at,
            body_text: None,
            body_html: None,
            flags: Vec::new(),
            raw_headers: String::new(),
            attachments: Vec::new(),
        }
    }

    pub fn is_seen(&self) -> bool {
        self.flags.iter().any(|f| f == SEEN_FLAG)
    }
}

/// Row returned by paginated listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub uid: u32,
    pub message_id: Option<String>,
    pub subject: String,
    pub from: Vec<EmailAddress>,
    pub received_at: DateTime<Utc>,
    pub flags: Vec<String>,
    pub seen: bool,
    pub has_attachments: bool,
}

impl MessageSummary {
    /// Keyset cursor pointing just after this row in listing order
    pub fn cursor(&self) -> PageCursor {
        PageCursor {
            received_at: self.received_at.timestamp(),
            uid: self.uid,
        }
    }
}

/// Position in the (received_at DESC, uid DESC) ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub received_at: i64,
    pub uid: u32,
}

/// Normalizes a flag list into a sorted set
pub fn normalize_flags<I, S>(flags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = flags
        .into_iter()
        .map(|f| f.as_ref().trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}
