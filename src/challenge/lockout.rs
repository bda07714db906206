//! Client-side view of the server-enforced lockout policy.
//!
//! The backend owns the counter and the threshold; this module only
//! interprets status responses into what the challenge UI renders and
//! decides which mode a failed verify lands in.

use crate::gateway::PinStatus;

use super::ChallengeMode;

/// Failures before the server locks PIN verification. Enforced
/// server-side; the client only renders it.
pub const MAX_FAILURES: u8 = 5;

/// Short-lived cached copy of the canonical lockout state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockoutView {
    pub failure_count: u8,
    pub locked: bool,
}

impl From<PinStatus> for LockoutView {
    fn from(status: PinStatus) -> Self {
        Self {
            failure_count: status.failure_count.min(MAX_FAILURES),
            locked: status.locked,
        }
    }
}

impl LockoutView {
    /// Fallback view when the read-after-write status query fails: bump the
    /// last known count and assume not locked. Transient errors must not
    /// produce false-positive lockouts; worst case the rendered count is
    /// one round trip stale.
    pub fn degraded_after_failure(previous: Option<LockoutView>) -> Self {
        let count = previous.map(|v| v.failure_count).unwrap_or(0);
        Self {
            failure_count: (count + 1).min(MAX_FAILURES),
            locked: false,
        }
    }

    /// Mode a failed verify lands in: locked accounts route to the email
    /// recovery step regardless of the mode that was attempted.
    pub fn next_mode_after_failure(&self, current: ChallengeMode) -> ChallengeMode {
        if self.locked {
            ChallengeMode::LockedEmailVerify
        } else {
            current
        }
    }
}
