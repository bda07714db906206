//! Error types for pingate.

use serde::Serialize;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors crossing the remote auth gateway boundary.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Bearer token absent or empty. Resolved locally, no network call.
    #[error("Missing bearer token")]
    MissingToken,

    #[error("The session token was rejected by the server")]
    TokenRejected,

    #[error("Unexpected response from {endpoint}: HTTP {status}")]
    UnexpectedStatus { endpoint: &'static str, status: u16 },

    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedResponse {
        endpoint: &'static str,
        reason: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Session lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No session token in storage")]
    NoToken,

    #[error("Session token rejected during validation")]
    TokenInvalid,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Per-tab storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("Corrupt storage file {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Failure outcomes of a challenge submission.
///
/// These never propagate past the orchestrator boundary: each one maps to a
/// short user-facing message via [`ChallengeError::user_message`], and the
/// orchestrator decides the mode transition (stay, or route to the locked
/// mode) before handing the message back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ChallengeError {
    /// Transport or server failure; state is retained for retry.
    Network,
    /// Wrong PIN; the server-side failure count after this attempt.
    IncorrectPin { failure_count: u8 },
    /// Verification refused because the account is already locked.
    Locked,
    /// Unlock code rejected.
    InvalidUnlockCode,
    /// Confirmation digits did not match the pending new PIN.
    PinMismatch,
    /// Input was not exactly six digits.
    MalformedPin,
}

impl ChallengeError {
    /// Short user-facing message, suitable for the challenge subtitle.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network => "Server error. Please try again.".to_string(),
            Self::IncorrectPin { failure_count } => {
                format!(
                    "Incorrect PIN ({}/{} attempts)",
                    failure_count,
                    crate::challenge::lockout::MAX_FAILURES
                )
            }
            Self::Locked => {
                "Too many failed attempts. Verify the code sent to your email.".to_string()
            }
            Self::InvalidUnlockCode => "Invalid verification code.".to_string(),
            Self::PinMismatch => "PINs do not match. Try again.".to_string(),
            Self::MalformedPin => "Enter exactly six digits.".to_string(),
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
