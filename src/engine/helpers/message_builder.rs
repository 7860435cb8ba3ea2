//! Turns raw fetched messages into cache records.
//!
//! Parsing is best effort: a header or part that cannot be decoded leaves
//! the corresponding field empty (or falls back to the raw header value)
//! and never fails the whole message.

use chrono::{DateTime, Utc};
use mailparse::{DispositionType, MailAddr, MailHeader, MailHeaderMap, ParsedMail};
use tracing::warn;

use crate::adapters::transport::RemoteMessage;
use crate::types::{normalize_flags, Attachment, EmailAddress, Message};

pub fn prepare_messages(account: &str, folder: &str, fetched: &[RemoteMessage]) -> Vec<Message> {
    fetched
        .iter()
        .map(|remote| build_message(account, folder, remote))
        .collect()
}

pub fn build_message(account: &str, folder: &str, remote: &RemoteMessage) -> Message {
    let (headers, body_offset) = match mailparse::parse_headers(&remote.raw) {
        Ok((headers, offset)) => (headers, offset),
        Err(e) => {
            warn!("uid {}: unparsable header block: {}", remote.uid, e);
            (Vec::new(), header_section_len(&remote.raw))
        }
    };
    let raw_headers = String::from_utf8_lossy(&remote.raw[..body_offset]).into_owned();
    let folded = reassemble_folded_headers(&raw_headers);

    let header = |name: &str| -> Option<String> {
        headers
            .get_first_value(name)
            .or_else(|| raw_header_value(&folded, name))
    };

    let received_at = header("Date")
        .and_then(|value| parse_date(&value))
        .or(remote.internal_date)
        .unwrap_or_else(|| {
            warn!("uid {}: no usable date, storing epoch", remote.uid);
            DateTime::<Utc>::default()
        });

    let mut msg = Message::new(account, folder, remote.uid, received_at);
    msg.subject = header("Subject").unwrap_or_default();
    msg.message_id = header("Message-ID")
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());
    msg.from = addresses(&headers, &folded, "From", remote.uid);
    msg.to = addresses(&headers, &folded, "To", remote.uid);
    msg.cc = addresses(&headers, &folded, "Cc", remote.uid);
    msg.bcc = addresses(&headers, &folded, "Bcc", remote.uid);
    msg.flags = normalize_flags(&remote.flags);
    msg.raw_headers = raw_headers;

    match mailparse::parse_mail(&remote.raw) {
        Ok(parsed) => {
            let mut parts = Parts::default();
            parts.collect(&parsed, remote.uid);
            msg.body_text = parts.text;
            msg.body_html = parts.html;
            msg.attachments = parts.attachments;
        }
        Err(e) => warn!("uid {}: unparsable body, keeping headers only: {}", remote.uid, e),
    }

    msg
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_str(value, "%d-%b-%Y %H:%M:%S %z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn addresses(headers: &[MailHeader], folded: &[String], name: &str, uid: u32) -> Vec<EmailAddress> {
    let raw_value = match headers.get_first_header(name) {
        Some(header) => match mailparse::addrparse_header(header) {
            Ok(list) => {
                let parsed = flatten_addresses(&list);
                if !parsed.is_empty() {
                    return parsed;
                }
                header.get_value()
            }
            Err(e) => {
                warn!("uid {}: unparsable {} header: {}", uid, name, e);
                header.get_value()
            }
        },
        None => match raw_header_value(folded, name) {
            Some(value) => match mailparse::addrparse(&value) {
                Ok(list) if !list.is_empty() => return flatten_addresses(&list),
                _ => value,
            },
            None => return Vec::new(),
        },
    };

    // Keep what the sender wrote rather than dropping the field
    let raw_value = raw_value.trim();
    if raw_value.is_empty() {
        Vec::new()
    } else {
        vec![EmailAddress::new(None, raw_value)]
    }
}

fn flatten_addresses(list: &[MailAddr]) -> Vec<EmailAddress> {
    let mut out = Vec::new();
    for addr in list {
        match addr {
            MailAddr::Single(info) => {
                out.push(EmailAddress::new(info.display_name.as_deref(), &info.addr));
            }
            MailAddr::Group(group) => {
                for member in &group.addrs {
                    out.push(EmailAddress::new(member.display_name.as_deref(), &member.addr));
                }
            }
        }
    }
    out
}

/// RFC 2822 headers can be folded across multiple lines.
/// A continuation line starts with whitespace.
fn reassemble_folded_headers(text: &str) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = headers.last_mut() {
                last.push(' ');
                last.push_str(line.trim());
            }
        } else if !line.is_empty() {
            headers.push(line.to_string());
        }
    }

    headers
}

fn raw_header_value(folded: &[String], name: &str) -> Option<String> {
    folded.iter().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
    })
}

/// Byte length of the header block including the blank separator line
fn header_section_len(raw: &[u8]) -> usize {
    let crlf = raw.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4);
    let lf = raw.windows(2).position(|w| w == b"\n\n").map(|p| p + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => raw.len(),
    }
}

#[derive(Default)]
struct Parts {
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<Attachment>,
}

impl Parts {
    fn collect(&mut self, part: &ParsedMail, uid: u32) {
        if !part.subparts.is_empty() {
            for sub in &part.subparts {
                self.collect(sub, uid);
            }
            return;
        }

        let disposition = part.get_content_disposition();
        let filename = disposition
            .params
            .get("filename")
            .or_else(|| part.ctype.params.get("name"))
            .cloned();

        if disposition.disposition == DispositionType::Attachment || filename.is_some() {
            match part.get_body_raw() {
                Ok(data) => self
                    .attachments
                    .push(Attachment::new(filename, part.ctype.mimetype.clone(), data)),
                Err(e) => warn!("uid {}: dropping undecodable attachment: {}", uid, e),
            }
            return;
        }

        let slot = match part.ctype.mimetype.as_str() {
            "text/plain" => &mut self.text,
            "text/html" => &mut self.html,
            _ => return,
        };
        if slot.is_some() {
            return;
        }
        match part.get_body() {
            Ok(body) => *slot = Some(body),
            Err(e) => warn!("uid {}: undecodable {} part: {}", uid, part.ctype.mimetype, e),
        }
    }
}
