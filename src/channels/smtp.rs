//! Outbound mail via lettre over implicit-TLS SMTP.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::info;

use crate::config::MailConfig;
use crate::error::SendError;

/// Sends plain-text mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SendError>;
}

/// SMTP mailer authenticated as the configured mailbox.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    config: MailConfig,
}

impl SmtpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> Result<Message, SendError> {
        let from: Mailbox = self
            .config
            .address
            .parse()
            .map_err(|e: lettre::address::AddressError| SendError::InvalidAddress {
                field: "from",
                reason: e.to_string(),
            })?;

        Message::builder()
            .from(from)
            .to(parse_recipient(to)?)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| SendError::Build(e.to_string()))
    }

    fn send_blocking(config: &MailConfig, email: &Message) -> Result<(), SendError> {
        let creds = Credentials::new(
            config.address.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&config.smtp_host)
            .map_err(|e| SendError::Connection(format!("SMTP relay error: {e}")))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        transport.send(email).map_err(classify_smtp_error)?;
        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SendError> {
        let email = self.build_message(to, subject, body)?;
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || Self::send_blocking(&config, &email))
            .await
            .map_err(|e| SendError::Connection(format!("SMTP task panicked: {e}")))??;

        info!(to = %to, "Email sent");
        Ok(())
    }
}

/// Parse a `From`-style header value into a recipient mailbox.
///
/// Falls back to the bare `<addr>` part when the display name does not parse
/// (e.g. it is still RFC 2047 encoded).
pub fn parse_recipient(to: &str) -> Result<Mailbox, SendError> {
    let to = to.trim();
    if let Ok(mailbox) = to.parse::<Mailbox>() {
        return Ok(mailbox);
    }

    let bare = match (to.rfind('<'), to.rfind('>')) {
        (Some(start), Some(end)) if end > start => &to[start + 1..end],
        _ => to,
    };
    bare.trim()
        .parse::<Mailbox>()
        .map_err(|e| SendError::InvalidAddress {
            field: "to",
            reason: format!("{to}: {e}"),
        })
}

fn classify_smtp_error(e: lettre::transport::smtp::Error) -> SendError {
    match e.status() {
        // 530/534/535: authentication required / mechanism too weak / credentials invalid
        Some(code) if code.to_string().starts_with("53") => SendError::Auth(e.to_string()),
        Some(_) => SendError::Rejected(e.to_string()),
        None => SendError::Connection(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn config() -> MailConfig {
        MailConfig {
            address: "me@example.com".into(),
            password: SecretString::from("pass"),
            imap_host: "imap.example.com".into(),
            imap_port: 993,
            smtp_host: "smtp.example.com".into(),
            smtp_port: 465,
        }
    }

    #[test]
    fn recipient_plain_address() {
        let mb = parse_recipient("a@x.com").unwrap();
        assert_eq!(mb.email.to_string(), "a@x.com");
    }

    #[test]
    fn recipient_with_display_name() {
        let mb = parse_recipient("Alice Example <alice@example.com>").unwrap();
        assert_eq!(mb.email.to_string(), "alice@example.com");
    }

    #[test]
    fn recipient_with_encoded_display_name_falls_back_to_address() {
        let mb = parse_recipient("=?utf-8?q?Ren=C3=A9?= <rene@example.com>").unwrap();
        assert_eq!(mb.email.to_string(), "rene@example.com");
    }

    #[test]
    fn recipient_garbage_is_invalid_address() {
        assert!(matches!(
            parse_recipient("not an address"),
            Err(SendError::InvalidAddress { field: "to", .. })
        ));
    }

    #[test]
    fn builds_plain_text_reply() {
        let mailer = SmtpMailer::new(config());
        let msg = mailer
            .build_message("a@x.com", "Re: Hi", "Thanks, will check.")
            .unwrap();
        let formatted = String::from_utf8(msg.formatted()).unwrap();
        assert!(formatted.contains("From: me@example.com"));
        assert!(formatted.contains("To: a@x.com"));
        assert!(formatted.contains("Subject: Re: Hi"));
        assert!(formatted.contains("Thanks, will check."));
    }

    #[test]
    fn invalid_sender_config_is_reported() {
        let mut cfg = config();
        cfg.address = "broken".into();
        let mailer = SmtpMailer::new(cfg);
        assert!(matches!(
            mailer.build_message("a@x.com", "s", "b"),
            Err(SendError::InvalidAddress { field: "from", .. })
        ));
    }
}
