//! Remote auth gateway boundary.
//!
//! The backend owns every trust decision (PIN verification, lockout
//! threshold, unlock codes). This module only specifies the boundary as a
//! trait plus the HTTP adapter; the rest of the crate is written against
//! the trait so tests can substitute a scripted fake.

mod http;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;

use crate::error::GatewayError;

pub use http::HttpAuthGateway;

/// Canonical lockout state as reported by `GET /pin/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PinStatus {
    pub locked: bool,
    #[serde(rename = "failureCount")]
    pub failure_count: u8,
}

/// Backend operations for PIN step-up authentication.
///
/// Every call carries the primary session bearer token. An empty token is a
/// precondition failure ([`GatewayError::MissingToken`]) resolved locally,
/// never a network call.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// `POST /pin/register` — activate a new PIN.
    async fn register_pin(&self, token: &SecretString, pin: &str) -> Result<(), GatewayError>;

    /// `POST /pin/verify` — check submitted digits. `Ok(false)` is a wrong
    /// PIN; `Err` is transport or server failure.
    async fn verify_pin(&self, token: &SecretString, pin: &str) -> Result<bool, GatewayError>;

    /// `GET /pin/status` — canonical `{locked, failureCount}`.
    async fn pin_status(&self, token: &SecretString) -> Result<PinStatus, GatewayError>;

    /// `DELETE /pin` — deactivate the PIN feature.
    async fn delete_pin(&self, token: &SecretString) -> Result<(), GatewayError>;

    /// `GET /pin/check` — whether a PIN is currently configured.
    async fn pin_configured(&self, token: &SecretString) -> Result<bool, GatewayError>;

    /// `POST /pin/unlock-request` — send a one-time code to the account email.
    async fn request_unlock_code(&self, token: &SecretString) -> Result<(), GatewayError>;

    /// `POST /pin/unlock` — redeem the emailed code. `Ok(false)` is an
    /// invalid code; `Ok(true)` implies the lock is cleared and the PIN
    /// removed server-side.
    async fn verify_unlock_code(
        &self,
        token: &SecretString,
        code: &str,
    ) -> Result<bool, GatewayError>;

    /// `GET /token/validate` — validate the primary session token.
    /// [`GatewayError::TokenRejected`] on 401.
    async fn validate_token(&self, token: &SecretString) -> Result<(), GatewayError>;
}
