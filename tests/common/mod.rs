//! Shared test harness: a behavioral fake of the remote auth backend.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use pingate::error::GatewayError;
use pingate::gateway::{AuthGateway, PinStatus};

pub const UNLOCK_CODE: &str = "913407";
const LOCK_THRESHOLD: u8 = 5;

/// Route crate logs through the test harness when `RUST_LOG` is set.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// In-process stand-in for the backend, enforcing the server-side rules
/// the client renders: failure counting, the 5-attempt lock, and the
/// unlock-deletes-PIN recovery semantics. Every call briefly sleeps so an
/// accidental overlap of two calls would be observed by the concurrency
/// counter.
#[derive(Default)]
pub struct FakeBackend {
    pin: Mutex<Option<String>>,
    failures: AtomicU8,
    locked: AtomicBool,
    token_valid: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<&'static str>>,
}

struct CallGuard<'a>(&'a FakeBackend);

impl<'a> CallGuard<'a> {
    async fn enter(backend: &'a FakeBackend, endpoint: &'static str) -> CallGuard<'a> {
        backend.calls.lock().unwrap().push(endpoint);
        let current = backend.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        backend.max_in_flight.fetch_max(current, Ordering::SeqCst);
        // Widen the window so overlapping calls would be caught.
        tokio::time::sleep(Duration::from_millis(2)).await;
        CallGuard(backend)
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        backend.token_valid.store(true, Ordering::SeqCst);
        backend
    }

    pub fn with_pin(pin: &str) -> Self {
        let backend = Self::new();
        *backend.pin.lock().unwrap() = Some(pin.to_string());
        backend
    }

    pub fn invalidate_token(&self) {
        self.token_valid.store(false, Ordering::SeqCst);
    }

    pub fn has_pin(&self) -> bool {
        self.pin.lock().unwrap().is_some()
    }

    pub fn locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously outstanding calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn check_token(&self, token: &SecretString) -> Result<(), GatewayError> {
        use secrecy::ExposeSecret;
        if token.expose_secret().trim().is_empty() {
            return Err(GatewayError::MissingToken);
        }
        if !self.token_valid.load(Ordering::SeqCst) {
            return Err(GatewayError::TokenRejected);
        }
        Ok(())
    }
}

#[async_trait]
impl AuthGateway for FakeBackend {
    async fn register_pin(&self, token: &SecretString, pin: &str) -> Result<(), GatewayError> {
        let _call = CallGuard::enter(self, "/pin/register").await;
        self.check_token(token)?;
        *self.pin.lock().unwrap() = Some(pin.to_string());
        self.failures.store(0, Ordering::SeqCst);
        self.locked.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn verify_pin(&self, token: &SecretString, pin: &str) -> Result<bool, GatewayError> {
        let _call = CallGuard::enter(self, "/pin/verify").await;
        self.check_token(token)?;
        if self.locked.load(Ordering::SeqCst) {
            // The server refuses verification outright while locked.
            return Ok(false);
        }
        let correct = self.pin.lock().unwrap().as_deref() == Some(pin);
        if correct {
            self.failures.store(0, Ordering::SeqCst);
        } else {
            let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
            if failures >= LOCK_THRESHOLD {
                self.locked.store(true, Ordering::SeqCst);
            }
        }
        Ok(correct)
    }

    async fn pin_status(&self, token: &SecretString) -> Result<PinStatus, GatewayError> {
        let _call = CallGuard::enter(self, "/pin/status").await;
        self.check_token(token)?;
        Ok(PinStatus {
            locked: self.locked.load(Ordering::SeqCst),
            failure_count: self.failures.load(Ordering::SeqCst),
        })
    }

    async fn delete_pin(&self, token: &SecretString) -> Result<(), GatewayError> {
        let _call = CallGuard::enter(self, "/pin").await;
        self.check_token(token)?;
        *self.pin.lock().unwrap() = None;
        self.failures.store(0, Ordering::SeqCst);
        self.locked.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn pin_configured(&self, token: &SecretString) -> Result<bool, GatewayError> {
        let _call = CallGuard::enter(self, "/pin/check").await;
        self.check_token(token)?;
        Ok(self.pin.lock().unwrap().is_some())
    }

    async fn request_unlock_code(&self, token: &SecretString) -> Result<(), GatewayError> {
        let _call = CallGuard::enter(self, "/pin/unlock-request").await;
        self.check_token(token)?;
        Ok(())
    }

    async fn verify_unlock_code(
        &self,
        token: &SecretString,
        code: &str,
    ) -> Result<bool, GatewayError> {
        let _call = CallGuard::enter(self, "/pin/unlock").await;
        self.check_token(token)?;
        if code != UNLOCK_CODE {
            return Ok(false);
        }
        // Recovery both clears the lock and deletes the PIN.
        self.locked.store(false, Ordering::SeqCst);
        self.failures.store(0, Ordering::SeqCst);
        *self.pin.lock().unwrap() = None;
        Ok(true)
    }

    async fn validate_token(&self, token: &SecretString) -> Result<(), GatewayError> {
        let _call = CallGuard::enter(self, "/token/validate").await;
        self.check_token(token)
    }
}
