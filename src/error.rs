//! Error types for the mail responder.

use std::path::PathBuf;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Send error: {0}")]
    Send(#[from] SendError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox (IMAP) errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Failed to mark message {id} as seen: {reason}")]
    MarkSeen { id: String, reason: String },

    #[error("Mailbox session already closed")]
    Closed,
}

/// Message parsing errors. Scoped to a single message.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Message {id} is not a parseable RFC 5322 message")]
    Unparseable { id: String },

    #[error("Message {id} has no From header")]
    MissingSender { id: String },

    #[error("Message {id} body could not be decoded: {reason}")]
    InvalidBody { id: String, reason: String },
}

/// Reply generation errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned an empty reply")]
    EmptyResponse { provider: String },
}

/// Outbound mail errors.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Invalid {field} address: {reason}")]
    InvalidAddress { field: &'static str, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP authentication failed: {0}")]
    Auth(String),

    #[error("SMTP connection failed: {0}")]
    Connection(String),

    #[error("SMTP server rejected message: {0}")]
    Rejected(String),
}

/// Processed-state persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
