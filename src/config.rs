//! Configuration for pingate.
//!
//! Settings are loaded with priority: env var > default. The embedding
//! application is expected to call `dotenvy::dotenv()` (or our `from_env`,
//! which does it) early in startup.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

const DEFAULT_API_BASE_URL: &str = "https://api.daylog.app";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Main configuration for the PIN authentication client.
#[derive(Debug, Clone)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub storage: StorageConfig,
}

/// Remote auth gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL for the auth endpoints (e.g. https://api.daylog.app).
    pub base_url: Url,
    /// Per-request timeout applied to the shared HTTP client.
    pub request_timeout: Duration,
}

/// Per-tab storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding the session state file (default: ~/.pingate).
    pub state_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults. Loads `./.env` via dotenvy first (never overwrites
    /// existing vars).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Ok(Self {
            gateway: GatewayConfig::resolve()?,
            storage: StorageConfig::resolve()?,
        })
    }
}

impl GatewayConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let raw_url =
            optional_env("PINGATE_API_BASE_URL")?.unwrap_or_else(|| DEFAULT_API_BASE_URL.into());
        let base_url = Url::parse(&raw_url).map_err(|e| ConfigError::InvalidValue {
            key: "PINGATE_API_BASE_URL".to_string(),
            message: format!("must be a valid URL: {e}"),
        })?;

        let request_timeout = optional_env("PINGATE_REQUEST_TIMEOUT_SECS")?
            .map(|s| s.parse())
            .transpose()
            .map_err(|e| ConfigError::InvalidValue {
                key: "PINGATE_REQUEST_TIMEOUT_SECS".to_string(),
                message: format!("must be a valid integer: {e}"),
            })?
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));

        Ok(Self {
            base_url,
            request_timeout,
        })
    }
}

impl StorageConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            state_dir: optional_env("PINGATE_STATE_DIR")?
                .map(PathBuf::from)
                .unwrap_or_else(default_state_dir),
        })
    }
}

/// Get the default state directory (~/.pingate).
pub fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pingate")
}

/// Read an env var, treating unset and empty as absent.
fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "not valid unicode".to_string(),
        }),
    }
}
