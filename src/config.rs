//! Configuration types.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// IMAP over implicit TLS.
pub const IMAP_PORT: u16 = 993;
/// SMTP over implicit TLS.
pub const SMTP_PORT: u16 = 465;
/// Pause between polling cycles.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Where processed message ids are persisted.
pub const STATE_FILE: &str = "processed_emails.json";
/// Address the UI server listens on.
pub const HTTP_ADDR: &str = "127.0.0.1:5000";
/// Model used for reply generation.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Mailbox credentials and hosts.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Mailbox address; used as IMAP/SMTP login and as the reply sender.
    pub address: String,
    /// Password or app token.
    pub password: SecretString,
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
}

/// Language-model settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub mail: MailConfig,
    pub llm: LlmConfig,
    pub state_path: PathBuf,
    pub poll_interval: Duration,
    pub http_addr: SocketAddr,
}

impl Config {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| -> Result<String, ConfigError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let mail = MailConfig {
            address: require("EMAIL")?,
            password: SecretString::from(require("APP_PASSWORD")?),
            imap_host: require("IMAP_SERVER")?,
            imap_port: IMAP_PORT,
            smtp_host: require("SMTP_SERVER")?,
            smtp_port: SMTP_PORT,
        };

        let llm = LlmConfig {
            api_key: SecretString::from(require("OPENAI_API_KEY")?),
            model: DEFAULT_MODEL.to_string(),
        };

        let http_addr = HTTP_ADDR
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "HTTP_ADDR".into(),
                message: e.to_string(),
            })?;

        Ok(Self {
            mail,
            llm,
            state_path: PathBuf::from(STATE_FILE),
            poll_interval: POLL_INTERVAL,
            http_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("EMAIL", "me@example.com"),
            ("APP_PASSWORD", "app-token"),
            ("IMAP_SERVER", "imap.example.com"),
            ("SMTP_SERVER", "smtp.example.com"),
            ("OPENAI_API_KEY", "sk-test"),
        ])
    }

    #[test]
    fn builds_from_complete_lookup() {
        let env = full_env();
        let config = Config::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.mail.address, "me@example.com");
        assert_eq!(config.mail.password.expose_secret(), "app-token");
        assert_eq!(config.mail.imap_host, "imap.example.com");
        assert_eq!(config.mail.imap_port, 993);
        assert_eq!(config.mail.smtp_port, 465);
        assert_eq!(config.llm.api_key.expose_secret(), "sk-test");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.state_path, PathBuf::from("processed_emails.json"));
        assert_eq!(config.http_addr.port(), 5000);
    }

    #[test]
    fn missing_variable_is_reported_by_name() {
        let mut env = full_env();
        env.remove("SMTP_SERVER");
        let err = Config::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "SMTP_SERVER"));
    }

    #[test]
    fn blank_variable_counts_as_missing() {
        let mut env = full_env();
        env.insert("EMAIL", "   ");
        let err = Config::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "EMAIL"));
    }
}
