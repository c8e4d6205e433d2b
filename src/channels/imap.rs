//! Mailbox access: raw IMAP over rustls.
//!
//! The socket is blocking; every exchange runs inside `spawn_blocking` and the
//! connection is moved in and out of the blocking task.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use super::types::RawMessage;
use crate::config::MailConfig;
use crate::error::MailboxError;

/// Socket read/write timeout.
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens mailbox sessions.
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// Connect, authenticate and select the inbox.
    async fn connect(&self) -> Result<Box<dyn MailboxSession>, MailboxError>;
}

/// An open, authenticated mailbox session.
///
/// Callers must `close()` the session on every path once connected.
#[async_trait]
pub trait MailboxSession: Send {
    /// All unread messages received on or after `since` (server-side filter).
    async fn fetch_unseen_since(&mut self, since: NaiveDate) -> Result<Vec<RawMessage>, MailboxError>;

    /// Set the `\Seen` flag on a message.
    async fn mark_seen(&mut self, id: &str) -> Result<(), MailboxError>;

    /// Log out and release the connection.
    async fn close(self: Box<Self>);
}

/// Format a date the way IMAP SEARCH expects it, e.g. `05-Mar-2025`.
pub fn imap_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

/// Quote a string for use as an IMAP quoted-string.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Parse the ids out of `* SEARCH 1 2 3` lines.
fn parse_search(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace())
        .map(str::to_string)
        .collect()
}

/// Fetch the full message without setting `\Seen`; the flag is only set
/// explicitly once a reply has gone out.
fn fetch_command(uid: &str) -> String {
    format!("UID FETCH {uid} (BODY.PEEK[])")
}

/// If `line` ends in an IMAP literal marker `{n}`, return `n`.
fn literal_len(line: &str) -> Option<usize> {
    let line = line.trim_end_matches("\r\n");
    let rest = line.strip_suffix('}')?;
    let start = rest.rfind('{')?;
    rest[start + 1..].trim_end_matches('+').parse().ok()
}

// ── Blocking connection ─────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Untagged lines and literals collected for one command.
#[derive(Debug, Default)]
struct Response {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
}

struct ImapConnection {
    tls: TlsStream,
    next_tag: u32,
}

impl ImapConnection {
    fn open(config: &MailConfig) -> Result<Self, MailboxError> {
        let conn_err = |reason: String| MailboxError::Connection {
            host: config.imap_host.clone(),
            reason,
        };

        let tcp = TcpStream::connect((config.imap_host.as_str(), config.imap_port))
            .map_err(|e| conn_err(e.to_string()))?;
        tcp.set_read_timeout(Some(IO_TIMEOUT))
            .and_then(|()| tcp.set_write_timeout(Some(IO_TIMEOUT)))
            .map_err(|e| conn_err(e.to_string()))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(config.imap_host.clone())
            .map_err(|e| conn_err(format!("invalid server name: {e}")))?;
        let tls_conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| conn_err(e.to_string()))?;

        let mut conn = Self {
            tls: rustls::StreamOwned::new(tls_conn, tcp),
            next_tag: 1,
        };

        let greeting = conn.read_line().map_err(|e| conn_err(e.to_string()))?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(conn_err(format!("unexpected greeting: {}", greeting.trim_end())));
        }

        conn.command(&format!(
            "LOGIN {} {}",
            quote(&config.address),
            quote(config.password.expose_secret())
        ))
        .map_err(|e| conn_err(format!("login failed: {e}")))?;

        conn.command("SELECT \"INBOX\"")
            .map_err(|e| conn_err(format!("select failed: {e}")))?;

        Ok(conn)
    }

    fn read_line(&mut self) -> std::io::Result<String> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.tls.read(&mut byte)? {
                0 => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "IMAP connection closed",
                    ));
                }
                _ => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).into_owned());
                    }
                }
            }
        }
    }

    /// Send one tagged command and collect its response.
    ///
    /// Errors unless the tagged completion is `OK`.
    fn command(&mut self, cmd: &str) -> Result<Response, MailboxError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        let io_err = |e: std::io::Error| MailboxError::Fetch(e.to_string());

        self.tls
            .write_all(format!("{tag} {cmd}\r\n").as_bytes())
            .map_err(io_err)?;
        self.tls.flush().map_err(io_err)?;

        let mut response = Response::default();
        let tagged = format!("{tag} ");
        loop {
            let line = self.read_line().map_err(io_err)?;

            if let Some(status) = line.strip_prefix(&tagged) {
                if status.starts_with("OK") {
                    return Ok(response);
                }
                return Err(MailboxError::Fetch(status.trim_end().to_string()));
            }

            if let Some(n) = literal_len(&line) {
                let mut literal = vec![0u8; n];
                self.tls.read_exact(&mut literal).map_err(io_err)?;
                response.literals.push(literal);
            }
            response.lines.push(line);
        }
    }

    fn search_unseen_since(&mut self, since: NaiveDate) -> Result<Vec<String>, MailboxError> {
        let resp = self.command(&format!("UID SEARCH UNSEEN SINCE {}", imap_date(since)))?;
        Ok(parse_search(&resp.lines))
    }

    fn fetch_message(&mut self, uid: &str) -> Result<Option<Vec<u8>>, MailboxError> {
        let resp = self.command(&fetch_command(uid))?;
        Ok(resp.literals.into_iter().next())
    }

    fn store_seen(&mut self, uid: &str) -> Result<(), MailboxError> {
        self.command(&format!("UID STORE {uid} +FLAGS (\\Seen)"))
            .map(|_| ())
            .map_err(|e| MailboxError::MarkSeen {
                id: uid.to_string(),
                reason: e.to_string(),
            })
    }

    fn logout(&mut self) {
        if let Err(e) = self.command("LOGOUT") {
            debug!(error = %e, "IMAP logout did not complete cleanly");
        }
    }
}

// ── Async session ───────────────────────────────────────────────────

/// IMAP mailbox client built from `MailConfig`.
#[derive(Debug, Clone)]
pub struct ImapMailbox {
    config: MailConfig,
}

impl ImapMailbox {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailboxClient for ImapMailbox {
    async fn connect(&self) -> Result<Box<dyn MailboxSession>, MailboxError> {
        let config = self.config.clone();
        let conn = tokio::task::spawn_blocking(move || ImapConnection::open(&config))
            .await
            .map_err(|e| MailboxError::Connection {
                host: self.config.imap_host.clone(),
                reason: format!("IMAP task panicked: {e}"),
            })??;
        debug!(host = %self.config.imap_host, "IMAP session opened");
        Ok(Box::new(ImapSession { conn: Some(conn) }))
    }
}

struct ImapSession {
    conn: Option<ImapConnection>,
}

impl ImapSession {
    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&mut self, f: F) -> Result<T, MailboxError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapConnection) -> Result<T, MailboxError> + Send + 'static,
    {
        let mut conn = self.conn.take().ok_or(MailboxError::Closed)?;
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = f(&mut conn);
            (conn, result)
        })
        .await
        .map_err(|e| MailboxError::Fetch(format!("IMAP task panicked: {e}")))?;
        self.conn = Some(conn);
        result
    }
}

#[async_trait]
impl MailboxSession for ImapSession {
    async fn fetch_unseen_since(&mut self, since: NaiveDate) -> Result<Vec<RawMessage>, MailboxError> {
        self.with_conn(move |conn| {
            let uids = conn.search_unseen_since(since)?;
            let mut messages = Vec::with_capacity(uids.len());
            for uid in uids {
                match conn.fetch_message(&uid)? {
                    Some(data) => messages.push(RawMessage { id: uid, data }),
                    None => warn!(id = %uid, "FETCH returned no message body"),
                }
            }
            Ok(messages)
        })
        .await
    }

    async fn mark_seen(&mut self, id: &str) -> Result<(), MailboxError> {
        let uid = id.to_string();
        self.with_conn(move |conn| conn.store_seen(&uid)).await
    }

    async fn close(self: Box<Self>) {
        let ImapSession { conn } = *self;
        if let Some(mut conn) = conn {
            if let Err(e) = tokio::task::spawn_blocking(move || conn.logout()).await {
                warn!(error = %e, "IMAP logout task failed");
            }
        }
        debug!("IMAP session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imap_date_uses_day_month_year() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 5).unwrap();
        assert_eq!(imap_date(date), "05-Jan-2023");
    }

    #[test]
    fn search_lines_yield_ids() {
        let lines = vec![
            "* SEARCH 4 17 23\r\n".to_string(),
            "* OK still here\r\n".to_string(),
        ];
        assert_eq!(parse_search(&lines), vec!["4", "17", "23"]);
    }

    #[test]
    fn empty_search_yields_nothing() {
        let lines = vec!["* SEARCH\r\n".to_string()];
        assert!(parse_search(&lines).is_empty());
    }

    #[test]
    fn literal_marker_is_detected() {
        assert_eq!(literal_len("* 1 FETCH (UID 9 RFC822 {342}\r\n"), Some(342));
        assert_eq!(literal_len("* 1 FETCH (FLAGS (\\Seen))\r\n"), None);
        assert_eq!(literal_len("{12+}\r\n"), Some(12));
    }

    #[test]
    fn fetch_peeks_without_setting_seen() {
        let cmd = fetch_command("17");
        assert_eq!(cmd, "UID FETCH 17 (BODY.PEEK[])");
        assert!(!cmd.contains("RFC822"));
        assert!(!cmd.contains("(BODY[])"));
    }

    #[test]
    fn peek_response_literal_is_detected() {
        assert_eq!(literal_len("* 3 FETCH (UID 17 BODY[] {2048}\r\n"), Some(2048));
    }

    #[test]
    fn quoting_escapes_specials() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote(r#"pa"ss\word"#), r#""pa\"ss\\word""#);
    }
}
