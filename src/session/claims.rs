//! Local decode of session token claims.
//!
//! Decoding here is for UI convenience only (pre-filling the email, the
//! `has_password` capability flag). It is never a trust decision: the
//! token is validated by the backend regardless of what this parse yields.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

/// Claims we care about from the session token payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub email: Option<String>,
    /// Sign-in provider ("local", "google", ...). Social-provider accounts
    /// carry no password.
    #[serde(default)]
    pub provider: Option<String>,
}

impl TokenClaims {
    /// Capability flag derived once at session load, replacing ad-hoc
    /// provider string comparisons downstream.
    pub fn has_password(&self) -> bool {
        match self.provider.as_deref() {
            None | Some("local") => true,
            Some(_) => false,
        }
    }
}

/// Best-effort decode of a JWT-shaped token's payload segment. Returns
/// default (empty) claims for anything that does not parse.
pub fn decode_claims(token: &str) -> TokenClaims {
    let Some(payload) = token.split('.').nth(1) else {
        return TokenClaims::default();
    };
    let Ok(bytes) = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) else {
        return TokenClaims::default();
    };
    serde_json::from_slice(&bytes).unwrap_or_default()
}
