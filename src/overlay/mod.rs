//! Forced challenge overlay and its integrity watchdog.
//!
//! The overlay wraps a forced [`PinChallengeOrchestrator`] behind a
//! non-dismissable surface: while the challenge is required, dismissal is
//! refused and the platform adapter is expected to suppress every other
//! interaction (including the context menu). The watchdog observes the
//! presentation root; removing it while a challenge is still required
//! forces a full reload.
//!
//! The watchdog is an explicit best-effort deterrent against removing the
//! presentation layer with developer tooling. It is not a security
//! boundary and must never be the sole control; the PIN itself is
//! verified server-side.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::challenge::{
    ChallengePrompt, ChallengeResolution, PinChallengeOrchestrator, SubmitOutcome,
};

/// Opaque identifier of the overlay's root presentation node, minted by
/// the platform adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayHandle(pub u64);

/// Invoked when the watchdog detects removal of the observed root.
pub type ViolationHook = Arc<dyn Fn() + Send + Sync>;

/// Platform-specific structural-mutation observer. The observation
/// mechanism (a DOM mutation observer, a widget-tree listener) is an
/// adapter plugged into the overlay, not embedded in it.
pub trait IntegrityWatchdog: Send + Sync {
    /// Watch `root`; call `on_violation` if it is removed. Dropping the
    /// returned guard disarms the observation.
    fn observe(&self, root: OverlayHandle, on_violation: ViolationHook) -> Box<dyn WatchdogGuard>;
}

/// Active observation; dropping it stops the watchdog.
pub trait WatchdogGuard: Send {}

/// Platform hook that forces a full application reload.
pub trait ReloadHandler: Send + Sync {
    fn reload(&self);
}

/// Non-dismissable presentation layer hosting the forced challenge.
///
/// Mounted at the application root by the session gate, never reached by
/// user navigation. Same orchestrator and transition table as the
/// voluntary settings flows; the differences are the mount point, the
/// watchdog, and the refusal to dismiss.
pub struct ForcedLockOverlay {
    challenge: PinChallengeOrchestrator,
    resolution: Option<ChallengeResolution>,
    required: Arc<AtomicBool>,
    _watch: Box<dyn WatchdogGuard>,
}

impl ForcedLockOverlay {
    /// Mount the overlay and arm the watchdog over `root`.
    pub fn mount(
        challenge: PinChallengeOrchestrator,
        root: OverlayHandle,
        watchdog: &dyn IntegrityWatchdog,
        reload: Arc<dyn ReloadHandler>,
    ) -> Self {
        let required = Arc::new(AtomicBool::new(true));
        let reloaded = Arc::new(AtomicBool::new(false));

        let hook_required = Arc::clone(&required);
        let hook: ViolationHook = Arc::new(move || {
            if !hook_required.load(Ordering::SeqCst) {
                return;
            }
            // Exactly one reload per overlay, however often the violation
            // fires.
            if !reloaded.swap(true, Ordering::SeqCst) {
                tracing::warn!("Overlay root removed while challenge required; forcing reload");
                reload.reload();
            }
        });

        let watch = watchdog.observe(root, hook);
        Self {
            challenge,
            resolution: None,
            required,
            _watch: watch,
        }
    }

    /// Whether the challenge still gates the session.
    pub fn required(&self) -> bool {
        self.required.load(Ordering::SeqCst)
    }

    /// The terminal outcome, once the orchestrator reported closed.
    pub fn resolution(&self) -> Option<ChallengeResolution> {
        self.resolution
    }

    /// Attempt to dismiss the overlay. Refused while the challenge is
    /// required; the only way out is resolving the challenge.
    pub fn dismiss(&self) -> bool {
        !self.required()
    }

    pub fn prompt(&self) -> ChallengePrompt {
        self.challenge.prompt()
    }

    pub fn push_digit(&mut self, digit: char) -> bool {
        self.challenge.push_digit(digit)
    }

    pub fn pop_digit(&mut self) -> bool {
        self.challenge.pop_digit()
    }

    pub fn entry_ready(&self) -> bool {
        self.challenge.entry_ready()
    }

    /// Re-send the unlock email code; delegates to the orchestrator.
    pub async fn request_unlock_code(&mut self) -> Result<(), crate::error::ChallengeError> {
        self.challenge.request_unlock_code().await
    }

    /// Delegate a submission. A `Closed` outcome releases the overlay and
    /// disarms the watchdog's reload trigger.
    pub async fn submit(&mut self, value: &str) -> SubmitOutcome {
        let outcome = self.challenge.submit(value).await;
        if let SubmitOutcome::Closed(resolution) = &outcome {
            self.resolution = Some(*resolution);
            self.required.store(false, Ordering::SeqCst);
            tracing::info!("Forced challenge resolved, overlay released");
        }
        outcome
    }

    /// Submit the buffered digit entry once it is ready.
    pub async fn submit_entry(&mut self) -> SubmitOutcome {
        let outcome = self.challenge.submit_entry().await;
        if let SubmitOutcome::Closed(resolution) = &outcome {
            self.resolution = Some(*resolution);
            self.required.store(false, Ordering::SeqCst);
        }
        outcome
    }
}

/// Watchdog stub for tests and headless embedders: the violation hook can
/// be fired manually.
#[derive(Default)]
pub struct StubWatchdog {
    hooks: std::sync::Mutex<Vec<ViolationHook>>,
}

impl StubWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a structural mutation removing the observed root.
    pub fn fire_violation(&self) {
        let hooks = self.hooks.lock().expect("watchdog poisoned").clone();
        for hook in hooks {
            hook();
        }
    }
}

struct StubGuard;
impl WatchdogGuard for StubGuard {}

impl IntegrityWatchdog for StubWatchdog {
    fn observe(&self, _root: OverlayHandle, on_violation: ViolationHook) -> Box<dyn WatchdogGuard> {
        self.hooks
            .lock()
            .expect("watchdog poisoned")
            .push(on_violation);
        Box::new(StubGuard)
    }
}

/// Reload handler that counts invocations, for tests.
#[derive(Default)]
pub struct CountingReload {
    count: std::sync::atomic::AtomicUsize,
}

impl CountingReload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl ReloadHandler for CountingReload {
    fn reload(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
