//! Step-up PIN authentication client.
//!
//! A secondary six-digit factor layered on top of an existing bearer-token
//! session: setup, verification, change, and disable flows, a
//! server-enforced lockout with email-code recovery, and a non-dismissable
//! forced challenge overlay with tamper detection.
//!
//! The PIN is a UX-level friction factor verified by a remote service; the
//! client never derives, stores, or proves possession of secrets beyond
//! transmitting the entered digits over an authenticated channel.
//!
//! Structure, leaf-first:
//! - [`gateway`] — the backend boundary as a trait plus HTTP adapter.
//! - [`challenge`] — the challenge state machine and lockout policy.
//! - [`session`] — session lifecycle, per-tab storage, and the decision
//!   to force a challenge.
//! - [`overlay`] — the forced overlay and its integrity watchdog seam.

pub mod challenge;
pub mod config;
pub mod error;
pub mod gateway;
pub mod overlay;
pub mod session;

pub use challenge::{
    ChallengeFlow, ChallengeMode, ChallengePrompt, ChallengeResolution, PIN_LENGTH,
    PinChallengeOrchestrator, SubmitOutcome,
};
pub use config::Config;
pub use error::{ChallengeError, Error, Result};
pub use gateway::{AuthGateway, HttpAuthGateway, PinStatus};
pub use overlay::{ForcedLockOverlay, IntegrityWatchdog, OverlayHandle, ReloadHandler};
pub use session::{Session, SessionGate, SessionOutcome};
