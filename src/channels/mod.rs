//! Mail I/O: IMAP polling for inbound, SMTP via lettre for outbound.

pub mod imap;
pub mod parser;
pub mod smtp;
pub mod types;

pub use imap::{ImapMailbox, MailboxClient, MailboxSession};
pub use parser::parse_message;
pub use smtp::{Mailer, SmtpMailer};
pub use types::{MessageRecord, RawMessage};
