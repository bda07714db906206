//! HTTP adapter for the remote auth gateway.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use url::Url;

use crate::config::GatewayConfig;
use crate::error::GatewayError;

use super::{AuthGateway, PinStatus};

#[derive(Serialize)]
struct PinBody<'a> {
    pin: &'a str,
}

#[derive(Serialize)]
struct UnlockBody<'a> {
    code: &'a str,
}

/// [`AuthGateway`] implementation backed by a shared `reqwest` client.
///
/// PINs, unlock codes, and tokens are never logged; failures are reported
/// by endpoint name and status only.
pub struct HttpAuthGateway {
    client: Client,
    base_url: Url,
}

impl HttpAuthGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(config.request_timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url.clone(),
        }
    }

    fn request(
        &self,
        method: Method,
        path: &'static str,
        token: &SecretString,
    ) -> Result<RequestBuilder, GatewayError> {
        if token.expose_secret().trim().is_empty() {
            return Err(GatewayError::MissingToken);
        }
        let url = self
            .base_url
            .join(path)
            .map_err(|e| GatewayError::MalformedResponse {
                endpoint: path,
                reason: format!("invalid endpoint URL: {e}"),
            })?;
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(token.expose_secret()))
    }

    /// Endpoints where the body is a bare `true`/`false` answer. A 401 is
    /// a rejected session token, not a wrong PIN.
    async fn boolean_endpoint(
        &self,
        builder: RequestBuilder,
        endpoint: &'static str,
    ) -> Result<bool, GatewayError> {
        let response = builder.send().await?;
        match response.status() {
            status if status.is_success() => {
                response
                    .json::<bool>()
                    .await
                    .map_err(|e| GatewayError::MalformedResponse {
                        endpoint,
                        reason: e.to_string(),
                    })
            }
            StatusCode::UNAUTHORIZED => Err(GatewayError::TokenRejected),
            status => Err(GatewayError::UnexpectedStatus {
                endpoint,
                status: status.as_u16(),
            }),
        }
    }

    /// Endpoints where only the status code matters.
    async fn unit_endpoint(
        &self,
        builder: RequestBuilder,
        endpoint: &'static str,
    ) -> Result<(), GatewayError> {
        let response = builder.send().await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => Err(GatewayError::TokenRejected),
            status => Err(GatewayError::UnexpectedStatus {
                endpoint,
                status: status.as_u16(),
            }),
        }
    }
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn register_pin(&self, token: &SecretString, pin: &str) -> Result<(), GatewayError> {
        let builder = self
            .request(Method::POST, "/pin/register", token)?
            .json(&PinBody { pin });
        self.unit_endpoint(builder, "/pin/register").await
    }

    async fn verify_pin(&self, token: &SecretString, pin: &str) -> Result<bool, GatewayError> {
        let builder = self
            .request(Method::POST, "/pin/verify", token)?
            .json(&PinBody { pin });
        self.boolean_endpoint(builder, "/pin/verify").await
    }

    async fn pin_status(&self, token: &SecretString) -> Result<PinStatus, GatewayError> {
        let response = self
            .request(Method::GET, "/pin/status", token)?
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => {
                response
                    .json::<PinStatus>()
                    .await
                    .map_err(|e| GatewayError::MalformedResponse {
                        endpoint: "/pin/status",
                        reason: e.to_string(),
                    })
            }
            StatusCode::UNAUTHORIZED => Err(GatewayError::TokenRejected),
            status => Err(GatewayError::UnexpectedStatus {
                endpoint: "/pin/status",
                status: status.as_u16(),
            }),
        }
    }

    async fn delete_pin(&self, token: &SecretString) -> Result<(), GatewayError> {
        let builder = self.request(Method::DELETE, "/pin", token)?;
        self.unit_endpoint(builder, "/pin").await
    }

    async fn pin_configured(&self, token: &SecretString) -> Result<bool, GatewayError> {
        let builder = self.request(Method::GET, "/pin/check", token)?;
        self.boolean_endpoint(builder, "/pin/check").await
    }

    async fn request_unlock_code(&self, token: &SecretString) -> Result<(), GatewayError> {
        let builder = self.request(Method::POST, "/pin/unlock-request", token)?;
        self.unit_endpoint(builder, "/pin/unlock-request").await
    }

    async fn verify_unlock_code(
        &self,
        token: &SecretString,
        code: &str,
    ) -> Result<bool, GatewayError> {
        let builder = self
            .request(Method::POST, "/pin/unlock", token)?
            .json(&UnlockBody { code });
        let response = builder.send().await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED => Err(GatewayError::TokenRejected),
            // The backend reports a bad or expired code as a client error.
            status if status.is_client_error() => Ok(false),
            status => Err(GatewayError::UnexpectedStatus {
                endpoint: "/pin/unlock",
                status: status.as_u16(),
            }),
        }
    }

    async fn validate_token(&self, token: &SecretString) -> Result<(), GatewayError> {
        let builder = self.request(Method::GET, "/token/validate", token)?;
        self.unit_endpoint(builder, "/token/validate").await
    }
}
