//! Session lifecycle and the decision to force a PIN challenge.
//!
//! The gate owns the primary bearer-token session: it validates the
//! persisted token on start-up, decides whether the tab must pass the
//! forced PIN challenge before anything else, and owns logout. The PIN
//! subsystem never outlives the session: logout clears every piece of
//! session and challenge state.

pub mod claims;
pub mod store;

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use secrecy::SecretString;

use crate::challenge::PinChallengeOrchestrator;
use crate::challenge::lockout::LockoutView;
use crate::error::{Error, StorageError};
use crate::gateway::AuthGateway;

use claims::decode_claims;
use store::{TabStore, keys};

/// Snapshot of the active session, safe to hand to presentation code.
/// The token itself stays inside the gate.
#[derive(Debug, Clone)]
pub struct Session {
    pub email: Option<String>,
    /// Persisted so elapsed session time survives a reload.
    pub session_start: DateTime<Utc>,
    /// Capability flag derived once at session load. Social-provider
    /// accounts have no password.
    pub has_password: bool,
}

/// Result of start-up validation.
pub enum SessionOutcome {
    /// No usable session; the embedder shows the login screen.
    LoggedOut,
    /// Session active. When `challenge` is present the tab must mount it
    /// in a forced overlay before any other interaction.
    Active {
        session: Session,
        challenge: Option<PinChallengeOrchestrator>,
    },
}

struct ActiveSession {
    token: SecretString,
    session: Session,
}

/// Owns session lifecycle and invokes the forced challenge.
pub struct SessionGate {
    gateway: Arc<dyn AuthGateway>,
    store: Arc<dyn TabStore>,
    active: Mutex<Option<ActiveSession>>,
    /// Bumped by every logout. Network responses captured under an older
    /// epoch are discarded rather than applied to stale state.
    epoch: AtomicU64,
    /// Serializes validate → status query → mount decision.
    lifecycle: tokio::sync::Mutex<()>,
}

impl SessionGate {
    pub fn new(gateway: Arc<dyn AuthGateway>, store: Arc<dyn TabStore>) -> Self {
        Self {
            gateway,
            store,
            active: Mutex::new(None),
            epoch: AtomicU64::new(0),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Start-up validation: read the persisted token, validate it with the
    /// backend, then decide whether a forced PIN challenge is required.
    ///
    /// No token means logout semantics immediately, with no network call.
    /// Token validation strictly precedes the PIN-status query, which
    /// strictly precedes the mount decision; a logout arriving mid-flight
    /// aborts the remaining steps via the epoch guard.
    pub async fn validate_session(&self) -> Result<SessionOutcome, Error> {
        let _ordering = self.lifecycle.lock().await;
        let epoch = self.epoch.load(Ordering::SeqCst);

        let Some(raw_token) = self.store.get(keys::TOKEN)? else {
            tracing::info!("No session token; logging out without network call");
            self.logout()?;
            return Ok(SessionOutcome::LoggedOut);
        };

        // Local decode for UI convenience only; trust comes from the
        // validate call below.
        let claims = decode_claims(&raw_token);
        let token = SecretString::from(raw_token);

        if let Err(e) = self.gateway.validate_token(&token).await {
            tracing::info!("Token validation failed, logging out: {e}");
            self.logout()?;
            return Ok(SessionOutcome::LoggedOut);
        }
        if self.epoch_changed(epoch) {
            return Ok(SessionOutcome::LoggedOut);
        }

        let session = Session {
            email: claims
                .email
                .clone()
                .or_else(|| self.store.get(keys::EMAIL).ok().flatten()),
            session_start: self.restore_or_init_session_start()?,
            has_password: claims.has_password(),
        };
        if let Some(email) = &session.email {
            self.store.set(keys::EMAIL, email)?;
        }
        *self.active.lock().expect("gate poisoned") = Some(ActiveSession {
            token: token.clone(),
            session: session.clone(),
        });
        tracing::info!("Session active");

        let challenge = self.trigger_pin_challenge(&token, epoch).await;
        Ok(SessionOutcome::Active { session, challenge })
    }

    /// Decide whether this tab must pass the forced challenge. Gateway
    /// errors here are swallowed: a non-responsive configured/lockout
    /// check must not produce a false-positive challenge or lockout.
    async fn trigger_pin_challenge(
        &self,
        token: &SecretString,
        epoch: u64,
    ) -> Option<PinChallengeOrchestrator> {
        if self.pin_verified() {
            tracing::debug!("PIN already verified for this tab; skipping challenge");
            return None;
        }

        let configured = match self.gateway.pin_configured(token).await {
            Ok(configured) => configured,
            Err(e) => {
                tracing::debug!("PIN-configured check failed, skipping challenge: {e}");
                false
            }
        };
        if self.epoch_changed(epoch) || !configured {
            return None;
        }

        let status = match self.gateway.pin_status(token).await {
            Ok(status) => LockoutView::from(status),
            Err(e) => {
                // Transient errors default to "not locked".
                tracing::debug!("Lockout status check failed, assuming unlocked: {e}");
                LockoutView::default()
            }
        };
        if self.epoch_changed(epoch) {
            return None;
        }

        tracing::info!(locked = status.locked, "Mounting forced PIN challenge");
        Some(PinChallengeOrchestrator::forced(
            Arc::clone(&self.gateway),
            token.clone(),
            status,
        ))
    }

    /// Build a voluntary (settings-initiated) challenge against the active
    /// session. Returns `None` when no session is active.
    pub fn begin_challenge(
        &self,
        flow: crate::challenge::ChallengeFlow,
    ) -> Option<PinChallengeOrchestrator> {
        let active = self.active.lock().expect("gate poisoned");
        let active = active.as_ref()?;
        Some(PinChallengeOrchestrator::new(
            Arc::clone(&self.gateway),
            active.token.clone(),
            flow,
        ))
    }

    /// Clear the session, the PIN-verified flag, and any challenge state.
    /// Idempotent: safe to call from explicit action, token-invalid
    /// detection, or the account-deletion flow.
    pub fn logout(&self) -> Result<(), StorageError> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *self.active.lock().expect("gate poisoned") = None;
        self.store.clear()?;
        tracing::info!("Session cleared");
        Ok(())
    }

    /// Record the outcome of the forced challenge. Passing the gate
    /// suppresses re-prompting for the rest of this tab's lifetime.
    pub fn on_forced_challenge_resolved(
        &self,
        resolution: crate::challenge::ChallengeResolution,
    ) -> Result<(), StorageError> {
        use crate::challenge::ChallengeResolution::*;
        match resolution {
            Verified | UnlockedPinRemoved | PinDisabled => self.mark_pin_verified(),
            PinRegistered | PinChanged => Ok(()),
        }
    }

    /// Mark that this tab's session has passed the PIN gate.
    pub fn mark_pin_verified(&self) -> Result<(), StorageError> {
        self.store.set(keys::PIN_VERIFIED, "true")
    }

    /// Whether this tab already passed the PIN gate.
    pub fn pin_verified(&self) -> bool {
        self.store
            .get(keys::PIN_VERIFIED)
            .ok()
            .flatten()
            .as_deref()
            == Some("true")
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().expect("gate poisoned").is_some()
    }

    pub fn session(&self) -> Option<Session> {
        self.active
            .lock()
            .expect("gate poisoned")
            .as_ref()
            .map(|active| active.session.clone())
    }

    fn epoch_changed(&self, seen: u64) -> bool {
        let changed = self.epoch.load(Ordering::SeqCst) != seen;
        if changed {
            tracing::debug!("Discarding response that arrived after logout");
        }
        changed
    }

    fn restore_or_init_session_start(&self) -> Result<DateTime<Utc>, StorageError> {
        if let Some(raw) = self.store.get(keys::SESSION_START_TIME)?
            && let Ok(parsed) = DateTime::parse_from_rfc3339(&raw)
        {
            return Ok(parsed.with_timezone(&Utc));
        }
        let now = Utc::now();
        self.store.set(keys::SESSION_START_TIME, &now.to_rfc3339())?;
        Ok(now)
    }
}
