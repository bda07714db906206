//! PIN challenge state machine.
//!
//! One orchestrator instance drives one challenge flow (setup, change,
//! disable, forced verify, or unlock) as an explicit tagged-union state
//! machine. It owns the current mode, maps each submitted value to a
//! transition plus a user-facing outcome, and is the sole recovery point
//! for gateway failures: nothing here propagates past [`submit`].
//!
//! [`submit`]: PinChallengeOrchestrator::submit

pub mod lockout;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use secrecy::SecretString;

use crate::error::{ChallengeError, GatewayError};
use crate::gateway::AuthGateway;

use lockout::LockoutView;

/// PIN values are exactly six numeric characters.
pub const PIN_LENGTH: usize = 6;

/// Current step of a challenge flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeMode {
    /// First-time setup: choose and activate a PIN.
    Register,
    /// Prove knowledge of the current PIN.
    VerifyOld,
    /// Choose a replacement PIN.
    SetNew,
    /// Re-enter the replacement to confirm it.
    ConfirmNew,
    /// Prove knowledge of the current PIN in order to turn the feature off.
    Disable,
    /// Account locked: redeem the one-time code sent by email.
    LockedEmailVerify,
}

/// Which flow this orchestrator instance is driving. The flow fixes the
/// entry mode and what a successful `VerifyOld` means: advance to `SetNew`
/// for a PIN change, or close verified for the forced session gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeFlow {
    Register,
    ChangePin,
    Disable,
    ForcedVerify,
    Unlock,
}

impl ChallengeFlow {
    fn entry_mode(self) -> ChallengeMode {
        match self {
            Self::Register => ChallengeMode::Register,
            Self::ChangePin | Self::ForcedVerify => ChallengeMode::VerifyOld,
            Self::Disable => ChallengeMode::Disable,
            Self::Unlock => ChallengeMode::LockedEmailVerify,
        }
    }
}

/// Terminal outcome of a challenge. "Closed" means the challenge UI
/// unmounts; there is no terminal state object beyond this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeResolution {
    /// A new PIN is active.
    PinRegistered,
    /// The forced gate passed; the session may proceed.
    Verified,
    /// The PIN was replaced.
    PinChanged,
    /// The PIN was deleted and the feature deactivated.
    PinDisabled,
    /// An unlock code cleared the lock; the PIN is deleted and the feature
    /// deactivated as part of recovery.
    UnlockedPinRemoved,
}

/// Result of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Flow finished; the caller unmounts the challenge.
    Closed(ChallengeResolution),
    /// The flow advanced to the next step.
    Advanced,
    /// Submission failed; the caller stays mounted, clears entered digits,
    /// and shows the message. The orchestrator has already applied any
    /// forced mode transition (e.g. into the locked step).
    Rejected(String),
}

/// Title and subtitle for the current step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengePrompt {
    pub title: String,
    pub subtitle: String,
}

/// Finite-state machine for one PIN challenge.
pub struct PinChallengeOrchestrator {
    gateway: Arc<dyn AuthGateway>,
    token: SecretString,
    flow: ChallengeFlow,
    mode: ChallengeMode,
    entry: String,
    pending_new_pin: Option<String>,
    lockout: Option<LockoutView>,
    /// Set while a gateway call is outstanding. Digit entry and deletion
    /// are discarded during that window, serializing attempts.
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag even if the submit future is dropped at an
/// await point.
struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    fn arm(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(Arc::clone(flag))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl PinChallengeOrchestrator {
    pub fn new(gateway: Arc<dyn AuthGateway>, token: SecretString, flow: ChallengeFlow) -> Self {
        Self {
            gateway,
            token,
            flow,
            mode: flow.entry_mode(),
            entry: String::new(),
            pending_new_pin: None,
            lockout: None,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Forced session-gate challenge, pre-seeded into the locked step when
    /// the status query reported a lock.
    pub fn forced(
        gateway: Arc<dyn AuthGateway>,
        token: SecretString,
        status: LockoutView,
    ) -> Self {
        let mut challenge = Self::new(gateway, token, ChallengeFlow::ForcedVerify);
        if status.locked {
            challenge.mode = ChallengeMode::LockedEmailVerify;
        }
        challenge.lockout = Some(status);
        challenge
    }

    pub fn mode(&self) -> ChallengeMode {
        self.mode
    }

    pub fn flow(&self) -> ChallengeFlow {
        self.flow
    }

    /// Last known lockout view, if any failed verify has cached one.
    pub fn lockout(&self) -> Option<LockoutView> {
        self.lockout
    }

    /// Whether a gateway call is outstanding for this challenge.
    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Append one digit to the entry buffer. Non-digits are discarded, as
    /// is everything while a submission is in flight. Returns true when
    /// the digit was accepted.
    pub fn push_digit(&mut self, digit: char) -> bool {
        if self.in_flight() || !digit.is_ascii_digit() || self.entry.len() >= self.entry_limit() {
            return false;
        }
        self.entry.push(digit);
        true
    }

    /// Remove the last entered digit. Disabled while in flight.
    pub fn pop_digit(&mut self) -> bool {
        if self.in_flight() {
            return false;
        }
        self.entry.pop().is_some()
    }

    pub fn entry_len(&self) -> usize {
        self.entry.len()
    }

    /// The happy path auto-submits once six digits are entered; unlock
    /// codes have no fixed length and are submitted explicitly.
    pub fn entry_ready(&self) -> bool {
        match self.mode {
            ChallengeMode::LockedEmailVerify => !self.entry.trim().is_empty(),
            _ => self.entry.len() == PIN_LENGTH,
        }
    }

    /// Submit the entry buffer, consuming it.
    pub async fn submit_entry(&mut self) -> SubmitOutcome {
        let value = std::mem::take(&mut self.entry);
        self.submit(&value).await
    }

    /// Map a submitted PIN (or unlock code) to a transition and outcome.
    ///
    /// Exactly one gateway call chain runs per submit; the caller clears
    /// its entered digits on `Rejected` and unmounts on `Closed`.
    pub async fn submit(&mut self, value: &str) -> SubmitOutcome {
        if let Err(err) = self.validate_input(value) {
            return SubmitOutcome::Rejected(err.user_message());
        }

        let _guard = InFlightGuard::arm(&self.in_flight);
        self.entry.clear();

        match self.mode {
            ChallengeMode::Register => self.submit_register(value).await,
            ChallengeMode::VerifyOld => self.submit_verify_old(value).await,
            ChallengeMode::SetNew => self.submit_set_new(value),
            ChallengeMode::ConfirmNew => self.submit_confirm_new(value).await,
            ChallengeMode::Disable => self.submit_disable(value).await,
            ChallengeMode::LockedEmailVerify => self.submit_unlock_code(value).await,
        }
    }

    /// Re-send the one-time email code. Only meaningful in the locked step.
    pub async fn request_unlock_code(&mut self) -> Result<(), ChallengeError> {
        if self.mode != ChallengeMode::LockedEmailVerify {
            return Ok(());
        }
        let _guard = InFlightGuard::arm(&self.in_flight);
        self.gateway
            .request_unlock_code(&self.token)
            .await
            .map_err(|e| {
                tracing::debug!("Unlock code request failed: {e}");
                ChallengeError::Network
            })
    }

    /// Title and subtitle for the current step, including the rendered
    /// failure countdown after an incorrect attempt.
    pub fn prompt(&self) -> ChallengePrompt {
        let attempts = self
            .lockout
            .filter(|view| !view.locked && view.failure_count > 0)
            .map(|view| {
                format!(
                    " ({}/{} attempts)",
                    view.failure_count,
                    lockout::MAX_FAILURES
                )
            })
            .unwrap_or_default();

        match self.mode {
            ChallengeMode::Register => ChallengePrompt {
                title: "Set up your PIN".to_string(),
                subtitle: "Choose a six-digit PIN to protect your diary.".to_string(),
            },
            ChallengeMode::VerifyOld => ChallengePrompt {
                title: "Enter your PIN".to_string(),
                subtitle: format!("Enter your current six-digit PIN{attempts}."),
            },
            ChallengeMode::SetNew => ChallengePrompt {
                title: "New PIN".to_string(),
                subtitle: "Choose your new six-digit PIN.".to_string(),
            },
            ChallengeMode::ConfirmNew => ChallengePrompt {
                title: "Confirm new PIN".to_string(),
                subtitle: "Enter the new PIN once more.".to_string(),
            },
            ChallengeMode::Disable => ChallengePrompt {
                title: "Turn off PIN".to_string(),
                subtitle: format!("Enter your PIN to turn the lock off{attempts}."),
            },
            ChallengeMode::LockedEmailVerify => ChallengePrompt {
                title: "Account locked".to_string(),
                subtitle: "Too many failed attempts. Enter the code sent to your email."
                    .to_string(),
            },
        }
    }

    fn entry_limit(&self) -> usize {
        match self.mode {
            // One-time codes vary in length; cap generously.
            ChallengeMode::LockedEmailVerify => 32,
            _ => PIN_LENGTH,
        }
    }

    fn validate_input(&self, value: &str) -> Result<(), ChallengeError> {
        match self.mode {
            ChallengeMode::LockedEmailVerify => {
                if value.trim().is_empty() {
                    Err(ChallengeError::InvalidUnlockCode)
                } else {
                    Ok(())
                }
            }
            _ => {
                if value.len() == PIN_LENGTH && value.chars().all(|c| c.is_ascii_digit()) {
                    Ok(())
                } else {
                    Err(ChallengeError::MalformedPin)
                }
            }
        }
    }

    async fn submit_register(&mut self, pin: &str) -> SubmitOutcome {
        match self.gateway.register_pin(&self.token, pin).await {
            Ok(()) => {
                tracing::info!("PIN registered");
                SubmitOutcome::Closed(ChallengeResolution::PinRegistered)
            }
            Err(e) => self.reject_gateway_error(e),
        }
    }

    async fn submit_verify_old(&mut self, pin: &str) -> SubmitOutcome {
        if self.known_locked() {
            self.mode = ChallengeMode::LockedEmailVerify;
            return SubmitOutcome::Rejected(ChallengeError::Locked.user_message());
        }

        match self.gateway.verify_pin(&self.token, pin).await {
            Ok(true) => match self.flow {
                ChallengeFlow::ForcedVerify => {
                    self.lockout = None;
                    SubmitOutcome::Closed(ChallengeResolution::Verified)
                }
                _ => {
                    self.lockout = None;
                    self.mode = ChallengeMode::SetNew;
                    SubmitOutcome::Advanced
                }
            },
            Ok(false) => self.handle_failed_verify().await,
            Err(e) => self.reject_gateway_error(e),
        }
    }

    fn submit_set_new(&mut self, pin: &str) -> SubmitOutcome {
        // Held locally until confirmed; never transmitted from this step.
        self.pending_new_pin = Some(pin.to_string());
        self.mode = ChallengeMode::ConfirmNew;
        SubmitOutcome::Advanced
    }

    async fn submit_confirm_new(&mut self, pin: &str) -> SubmitOutcome {
        let matches = self
            .pending_new_pin
            .as_deref()
            .is_some_and(|pending| pending == pin);
        if !matches {
            // pending_new_pin is retained so the user can retry the
            // confirmation without re-entering the new PIN step.
            return SubmitOutcome::Rejected(ChallengeError::PinMismatch.user_message());
        }

        match self.gateway.register_pin(&self.token, pin).await {
            Ok(()) => {
                self.pending_new_pin = None;
                tracing::info!("PIN updated");
                SubmitOutcome::Closed(ChallengeResolution::PinChanged)
            }
            Err(e) => self.reject_gateway_error(e),
        }
    }

    async fn submit_disable(&mut self, pin: &str) -> SubmitOutcome {
        if self.known_locked() {
            self.mode = ChallengeMode::LockedEmailVerify;
            return SubmitOutcome::Rejected(ChallengeError::Locked.user_message());
        }

        match self.gateway.verify_pin(&self.token, pin).await {
            Ok(true) => match self.gateway.delete_pin(&self.token).await {
                Ok(()) => {
                    tracing::info!("PIN deleted, feature deactivated");
                    SubmitOutcome::Closed(ChallengeResolution::PinDisabled)
                }
                Err(e) => self.reject_gateway_error(e),
            },
            Ok(false) => self.handle_failed_verify().await,
            Err(e) => self.reject_gateway_error(e),
        }
    }

    async fn submit_unlock_code(&mut self, code: &str) -> SubmitOutcome {
        match self.gateway.verify_unlock_code(&self.token, code.trim()).await {
            Ok(true) => {
                // Recovery trades the second factor away entirely: the
                // server has cleared the lock and deleted the PIN.
                tracing::info!("Unlock code accepted, PIN removed");
                SubmitOutcome::Closed(ChallengeResolution::UnlockedPinRemoved)
            }
            Ok(false) => SubmitOutcome::Rejected(ChallengeError::InvalidUnlockCode.user_message()),
            Err(e) => self.reject_gateway_error(e),
        }
    }

    /// Read-after-write: re-query the canonical lockout state after any
    /// failed verify. A failed re-query degrades to a not-locked view
    /// rather than surfacing an error.
    async fn handle_failed_verify(&mut self) -> SubmitOutcome {
        let view = match self.gateway.pin_status(&self.token).await {
            Ok(status) => LockoutView::from(status),
            Err(e) => {
                tracing::debug!("Status re-query after failed verify failed: {e}");
                LockoutView::degraded_after_failure(self.lockout)
            }
        };

        self.mode = view.next_mode_after_failure(self.mode);
        self.lockout = Some(view);

        if view.locked {
            SubmitOutcome::Rejected(ChallengeError::Locked.user_message())
        } else {
            SubmitOutcome::Rejected(
                ChallengeError::IncorrectPin {
                    failure_count: view.failure_count,
                }
                .user_message(),
            )
        }
    }

    fn known_locked(&self) -> bool {
        self.lockout.is_some_and(|view| view.locked)
    }

    fn reject_gateway_error(&self, error: GatewayError) -> SubmitOutcome {
        match &error {
            GatewayError::TokenRejected => {
                tracing::warn!("Session token rejected during challenge submission")
            }
            other => tracing::debug!("Gateway call failed during challenge: {other}"),
        }
        SubmitOutcome::Rejected(ChallengeError::Network.user_message())
    }
}
