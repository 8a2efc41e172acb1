//! Error types for the check-in orchestrator.
//!
//! This module defines the error hierarchy for configuration loading,
//! upstream API calls, the retry policy, image processing and email delivery.

use std::path::PathBuf;

use checkin_imaging::ImagingError;
use checkin_mailer::MailerError;

/// A specialized `Result` type for check-in operations.
pub type Result<T> = std::result::Result<T, CheckinError>;

/// Errors that can occur during a check-in run.
///
/// Only [`CheckinError::Transport`] is transient. Configuration errors stop
/// the process before any account runs; everything else aborts one account.
#[derive(Debug, thiserror::Error)]
pub enum CheckinError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A configuration file does not exist.
    #[error("Config file not found: '{path}'\n\nSuggestion: Create the file or pass its location with --profile / --accounts")]
    ConfigNotFound {
        /// Path where the file was expected.
        path: PathBuf,
    },

    /// Invalid TOML syntax or shape in a configuration file.
    #[error("Invalid TOML in config file '{path}': {message}\n\nSuggestion: Compare the file against the documented profile/accounts layout")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Connection, timeout or body-read failure talking to the upstream.
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Every attempt allowed by the retry policy failed with a transport error.
    #[error("Retried {operation} {attempts} times without a connection\n\nSuggestion: Check your network and the configured endpoints")]
    RetryExhausted {
        /// Name of the wrapped operation.
        operation: String,
        /// How many attempts were made.
        attempts: u32,
    },

    // ========================================================================
    // Upstream Errors
    // ========================================================================
    /// The upstream answered, but not in the expected shape.
    #[error("Unexpected response from {operation}: {message}")]
    MalformedResponse {
        /// Name of the operation whose response was malformed.
        operation: String,
        /// What was wrong with it.
        message: String,
    },

    /// No access token could be found in the token response.
    #[error("No access token in the upstream response\n\nSuggestion: Check that the openid for this account is valid")]
    TokenUnavailable,

    /// Node id or card number is still missing after applying fallbacks.
    #[error("Check-in data is incomplete (node id or card number missing)\n\nSuggestion: Check the openid, or set nid/cardNo for this account")]
    CheckInDataIncomplete,

    /// The upstream rejected the check-in.
    #[error("Check-in rejected with status {status}: {message}")]
    CheckInRejected {
        /// Application-level status returned by the upstream.
        status: String,
        /// Message returned by the upstream.
        message: String,
    },

    /// The reward image manifest endpoint did not answer with HTTP 200.
    #[error("Reward images are unavailable: the image manifest request was refused")]
    RewardImagesUnavailable,

    // ========================================================================
    // Local Errors
    // ========================================================================
    /// Compositing the reward images failed.
    #[error("Image processing failed: {0}")]
    Imaging(#[from] ImagingError),

    /// Sending the confirmation email failed.
    #[error("Email delivery failed: {0}")]
    Mailer(#[from] MailerError),

    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A run summary could not be serialized.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // State Machine Errors
    // ========================================================================
    /// Invalid step transition attempted.
    #[error("Invalid step transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current step.
        from: String,
        /// The attempted target step.
        to: String,
    },
}

impl CheckinError {
    /// Creates a new `ConfigNotFound` error.
    #[must_use]
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `RetryExhausted` error.
    #[must_use]
    pub fn retry_exhausted(operation: impl Into<String>, attempts: u32) -> Self {
        Self::RetryExhausted {
            operation: operation.into(),
            attempts,
        }
    }

    /// Creates a new `MalformedResponse` error.
    #[must_use]
    pub fn malformed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns `true` if this error is transient and may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
