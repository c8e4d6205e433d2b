//! Message types shared between the mailbox, parser and pipeline.

use serde::{Deserialize, Serialize};

/// A message as fetched from the mailbox, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Mailbox-assigned id (IMAP UID).
    pub id: String,
    /// Full RFC 5322 bytes.
    pub data: Vec<u8>,
}

impl RawMessage {
    pub fn new(id: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
        }
    }
}

/// A parsed inbound message.
///
/// Serialized form is the `new_email` notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub subject: String,
    /// Verbatim `From` header value.
    pub from: String,
    /// Decoded body text. HTML bodies keep their markup.
    pub body: String,
}

impl MessageRecord {
    /// Subject line for the reply.
    pub fn reply_subject(&self) -> String {
        format!("Re: {}", self.subject)
    }

    /// First `max` characters of the body, for log lines.
    pub fn body_preview(&self, max: usize) -> String {
        self.body.chars().take(max).collect()
    }
}
