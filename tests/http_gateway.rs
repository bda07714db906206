//! Integration tests for the HTTP gateway adapter.
//!
//! These start a real Axum server on a random port playing the diary
//! backend, and drive `HttpAuthGateway` (and the session gate on top of
//! it) over the wire.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;

use pingate::config::GatewayConfig;
use pingate::error::GatewayError;
use pingate::gateway::{AuthGateway, HttpAuthGateway};
use pingate::session::store::{MemoryTabStore, TabStore, keys};
use pingate::session::{SessionGate, SessionOutcome};

const GOOD_TOKEN: &str = "good-token";
const CORRECT_PIN: &str = "123456";
const UNLOCK_CODE: &str = "relock-9spin";

#[derive(Clone, Default)]
struct BackendState {
    locked: Arc<std::sync::atomic::AtomicBool>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {GOOD_TOKEN}"))
        .unwrap_or(false)
}

#[derive(Deserialize)]
struct PinBody {
    pin: String,
}

#[derive(Deserialize)]
struct CodeBody {
    code: String,
}

fn router(state: BackendState) -> Router {
    Router::new()
        .route(
            "/token/validate",
            get(|headers: HeaderMap| async move {
                if authorized(&headers) {
                    StatusCode::OK
                } else {
                    StatusCode::UNAUTHORIZED
                }
            }),
        )
        .route(
            "/pin/check",
            get(|headers: HeaderMap| async move {
                if authorized(&headers) {
                    Json(true).into_response()
                } else {
                    StatusCode::UNAUTHORIZED.into_response()
                }
            }),
        )
        .route(
            "/pin/status",
            get(
                |State(state): State<BackendState>, headers: HeaderMap| async move {
                    if !authorized(&headers) {
                        return StatusCode::UNAUTHORIZED.into_response();
                    }
                    let locked = state.locked.load(std::sync::atomic::Ordering::SeqCst);
                    Json(json!({
                        "locked": locked,
                        "failureCount": if locked { 5 } else { 2 }
                    }))
                    .into_response()
                },
            ),
        )
        .route(
            "/pin/verify",
            post(|headers: HeaderMap, Json(body): Json<PinBody>| async move {
                if !authorized(&headers) {
                    return StatusCode::UNAUTHORIZED.into_response();
                }
                Json(body.pin == CORRECT_PIN).into_response()
            }),
        )
        .route(
            "/pin/register",
            post(|headers: HeaderMap, Json(_body): Json<PinBody>| async move {
                if authorized(&headers) {
                    StatusCode::OK
                } else {
                    StatusCode::UNAUTHORIZED
                }
            }),
        )
        .route(
            "/pin",
            delete(|headers: HeaderMap| async move {
                if authorized(&headers) {
                    StatusCode::OK
                } else {
                    StatusCode::UNAUTHORIZED
                }
            }),
        )
        .route(
            "/pin/unlock-request",
            post(|headers: HeaderMap| async move {
                if authorized(&headers) {
                    StatusCode::OK
                } else {
                    StatusCode::UNAUTHORIZED
                }
            }),
        )
        .route(
            "/pin/unlock",
            post(
                |State(state): State<BackendState>,
                 headers: HeaderMap,
                 Json(body): Json<CodeBody>| async move {
                    if !authorized(&headers) {
                        return StatusCode::UNAUTHORIZED;
                    }
                    if body.code == UNLOCK_CODE {
                        state
                            .locked
                            .store(false, std::sync::atomic::Ordering::SeqCst);
                        StatusCode::OK
                    } else {
                        StatusCode::BAD_REQUEST
                    }
                },
            ),
        )
        .with_state(state)
}

fn is_bind_permission_error<E: std::fmt::Display>(err: &E) -> bool {
    err.to_string().contains("Operation not permitted")
        || err.to_string().contains("Permission denied")
}

/// Start the mock backend on a random port. Returns `None` when the test
/// sandbox forbids binding sockets.
async fn start_backend(state: BackendState) -> Option<SocketAddr> {
    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(e) if is_bind_permission_error(&e) => return None,
        Err(e) => panic!("Failed to bind mock backend: {e:?}"),
    };
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.ok();
    });
    Some(addr)
}

fn gateway_for(addr: SocketAddr) -> HttpAuthGateway {
    HttpAuthGateway::new(&GatewayConfig {
        base_url: url::Url::parse(&format!("http://{addr}")).expect("valid url"),
        request_timeout: Duration::from_secs(5),
    })
}

fn good_token() -> SecretString {
    SecretString::from(GOOD_TOKEN)
}

#[tokio::test]
async fn validates_token_and_reads_pin_state() {
    let Some(addr) = start_backend(BackendState::default()).await else {
        return;
    };
    let gateway = gateway_for(addr);
    let token = good_token();

    gateway.validate_token(&token).await.unwrap();
    assert!(gateway.pin_configured(&token).await.unwrap());

    let status = gateway.pin_status(&token).await.unwrap();
    assert!(!status.locked);
    assert_eq!(status.failure_count, 2);
}

#[tokio::test]
async fn verify_pin_returns_server_verdict() {
    let Some(addr) = start_backend(BackendState::default()).await else {
        return;
    };
    let gateway = gateway_for(addr);
    let token = good_token();

    assert!(gateway.verify_pin(&token, CORRECT_PIN).await.unwrap());
    assert!(!gateway.verify_pin(&token, "000000").await.unwrap());
}

#[tokio::test]
async fn rejected_token_maps_to_token_rejected() {
    let Some(addr) = start_backend(BackendState::default()).await else {
        return;
    };
    let gateway = gateway_for(addr);
    let token = SecretString::from("stale-token");

    let err = gateway.validate_token(&token).await.unwrap_err();
    assert!(matches!(err, GatewayError::TokenRejected));

    let err = gateway.pin_status(&token).await.unwrap_err();
    assert!(matches!(err, GatewayError::TokenRejected));
}

#[tokio::test]
async fn unlock_code_verdicts_round_trip() {
    let state = BackendState::default();
    state.locked.store(true, std::sync::atomic::Ordering::SeqCst);
    let Some(addr) = start_backend(state.clone()).await else {
        return;
    };
    let gateway = gateway_for(addr);
    let token = good_token();

    gateway.request_unlock_code(&token).await.unwrap();
    assert!(!gateway.verify_unlock_code(&token, "wrong").await.unwrap());
    assert!(gateway.verify_unlock_code(&token, UNLOCK_CODE).await.unwrap());
    assert!(!state.locked.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn register_and_delete_round_trip() {
    let Some(addr) = start_backend(BackendState::default()).await else {
        return;
    };
    let gateway = gateway_for(addr);
    let token = good_token();

    gateway.register_pin(&token, CORRECT_PIN).await.unwrap();
    gateway.delete_pin(&token).await.unwrap();
}

#[tokio::test]
async fn session_gate_runs_end_to_end_over_http() {
    let Some(addr) = start_backend(BackendState::default()).await else {
        return;
    };
    let store = Arc::new(MemoryTabStore::new());
    store.set(keys::TOKEN, GOOD_TOKEN).unwrap();

    let gate = SessionGate::new(Arc::new(gateway_for(addr)), store);
    match gate.validate_session().await.unwrap() {
        SessionOutcome::Active { challenge, .. } => {
            let mut challenge = challenge.expect("challenge required");
            assert!(matches!(
                challenge.submit("999999").await,
                pingate::SubmitOutcome::Rejected(_)
            ));
            assert_eq!(
                challenge.submit(CORRECT_PIN).await,
                pingate::SubmitOutcome::Closed(pingate::ChallengeResolution::Verified)
            );
        }
        SessionOutcome::LoggedOut => panic!("expected active session"),
    }
}

#[tokio::test]
async fn locked_backend_seeds_locked_challenge_over_http() {
    let state = BackendState::default();
    state.locked.store(true, std::sync::atomic::Ordering::SeqCst);
    let Some(addr) = start_backend(state).await else {
        return;
    };
    let store = Arc::new(MemoryTabStore::new());
    store.set(keys::TOKEN, GOOD_TOKEN).unwrap();

    let gate = SessionGate::new(Arc::new(gateway_for(addr)), store);
    match gate.validate_session().await.unwrap() {
        SessionOutcome::Active { challenge, .. } => {
            assert_eq!(
                challenge.expect("challenge required").mode(),
                pingate::ChallengeMode::LockedEmailVerify
            );
        }
        SessionOutcome::LoggedOut => panic!("expected active session"),
    }
}
