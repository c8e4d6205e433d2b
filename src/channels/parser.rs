//! Raw mailbox record → `MessageRecord`.
//!
//! Body selection rule: walk MIME parts in order, skip attachments, and keep
//! the *last* text/plain or text/html part seen. HTML is kept as-is.

use std::borrow::Cow;

use mail_parser::{MessageParser, MessagePart, MimeHeaders, PartType};

use super::types::{MessageRecord, RawMessage};
use crate::error::ParseError;

/// Parse a fetched message into a `MessageRecord`.
pub fn parse_message(raw: &RawMessage) -> Result<MessageRecord, ParseError> {
    let message = MessageParser::default()
        .parse(&raw.data)
        .ok_or_else(|| ParseError::Unparseable { id: raw.id.clone() })?;

    // mail-parser decodes RFC 2047 words and their charsets
    let subject = message.subject().unwrap_or_default().to_string();

    let from = message
        .header_raw("From")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ParseError::MissingSender { id: raw.id.clone() })?;

    let is_multipart = matches!(
        message.parts.first().map(|p| &p.body),
        Some(PartType::Multipart(_))
    );

    let body = if is_multipart {
        let mut body = None;
        for part in message.parts.iter().skip(1) {
            if is_attachment(part) || !is_readable_text(part) {
                continue;
            }
            if let Some(text) = part_text(part, &raw.id)? {
                body = Some(text);
            }
        }
        body
    } else {
        match message.parts.first() {
            Some(part) => part_text(part, &raw.id)?,
            None => None,
        }
    };

    Ok(MessageRecord {
        id: raw.id.clone(),
        subject,
        from,
        body: body.map(Cow::into_owned).unwrap_or_default(),
    })
}

fn is_attachment(part: &MessagePart<'_>) -> bool {
    part.content_disposition()
        .is_some_and(|cd| cd.ctype().eq_ignore_ascii_case("attachment"))
}

/// text/plain or text/html. A part without Content-Type defaults to text/plain.
fn is_readable_text(part: &MessagePart<'_>) -> bool {
    match part.content_type() {
        None => matches!(part.body, PartType::Text(_)),
        Some(ct) => {
            ct.ctype().eq_ignore_ascii_case("text")
                && ct
                    .subtype()
                    .is_some_and(|s| s.eq_ignore_ascii_case("plain") || s.eq_ignore_ascii_case("html"))
        }
    }
}

/// Decoded text of a leaf part. Containers yield `None`.
fn part_text<'a>(part: &'a MessagePart<'_>, id: &str) -> Result<Option<Cow<'a, str>>, ParseError> {
    let text: Cow<'a, str> = match &part.body {
        PartType::Text(text) | PartType::Html(text) => Cow::Borrowed(text.as_ref()),
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) => {
            let s = std::str::from_utf8(bytes.as_ref()).map_err(|e| ParseError::InvalidBody {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
            Cow::Borrowed(s)
        }
        PartType::Message(_) | PartType::Multipart(_) => return Ok(None),
    };

    // Lossy charset decoding leaves replacement characters behind.
    if text.contains(char::REPLACEMENT_CHARACTER) {
        return Err(ParseError::InvalidBody {
            id: id.to_string(),
            reason: "payload is not valid in its declared charset".into(),
        });
    }

    Ok(Some(text))
}
