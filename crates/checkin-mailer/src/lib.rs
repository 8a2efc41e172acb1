//! Check-in Mailer
//!
//! SMTP delivery of the daily confirmation image via lettre.
//!
//! This crate provides the relay configuration and a [`Mailer`] that sends a
//! plain-text message with the composited image attached.

mod sender;

pub use sender::{build_message, Mailer};

use serde::Deserialize;
use thiserror::Error;

/// Default SMTP submission port (implicit TLS).
pub const DEFAULT_SMTP_PORT: u16 = 465;

/// Errors that can occur while sending a confirmation email.
#[derive(Debug, Error)]
pub enum MailerError {
    /// SMTP transport failure (connection, TLS, authentication, delivery).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// Sender or recipient address could not be parsed.
    #[error("email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("email build error: {0}")]
    Build(String),

    /// The attachment could not be read.
    #[error("failed to read attachment: {0}")]
    Attachment(#[from] std::io::Error),
}

/// Result type for mailer operations.
pub type Result<T> = std::result::Result<T, MailerError>;

fn default_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_subject() -> String {
    "Your Check-In Completed".to_string()
}

fn default_body() -> String {
    "Here is your confirmation image for the check-in.".to_string()
}

/// SMTP relay settings and the fixed sender identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailConfig {
    /// Relay hostname, e.g. `smtp.qq.com`.
    pub host: String,

    /// Relay port, implicit TLS.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login name, also the sender address unless `from` is set.
    pub username: String,

    /// Password or app-specific authorization code.
    #[serde(default)]
    pub password: String,

    /// Sender address override.
    #[serde(default)]
    pub from: Option<String>,

    /// Subject line of the confirmation email.
    #[serde(default = "default_subject")]
    pub subject: String,

    /// Plain-text body of the confirmation email.
    #[serde(default = "default_body")]
    pub body: String,
}

impl MailConfig {
    /// Creates a config with default port, subject and body.
    #[must_use]
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SMTP_PORT,
            username: username.into(),
            password: String::new(),
            from: None,
            subject: default_subject(),
            body: default_body(),
        }
    }

    /// Sets the password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Address the message is sent from.
    #[must_use]
    pub fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.username)
    }
}
