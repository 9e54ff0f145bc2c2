//! HTTP transport for CSW request/response exchange.
//!
//! All four operations travel as XML over HTTP POST. The transport is a
//! trait so tests and alternative stacks can substitute the network; the
//! production implementation wraps a [`reqwest::Client`] with basic auth,
//! optional PEM client identity, and split connect/receive timeouts.

use crate::config::SourceConfiguration;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the transport layer.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Network or connection error.
    #[error("network error: {0}")]
    Network(String),

    /// The request exceeded a configured timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// 401 Unauthorized.
    #[error("authentication failed (401)")]
    Unauthorized,

    /// 403 Forbidden.
    #[error("access denied (403)")]
    Forbidden,

    /// Any other non-success status, with the response body retained.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Client identity material could not be loaded.
    #[error("client identity error: {0}")]
    Identity(String),
}

/// Request/response exchange with a remote catalogue.
#[async_trait]
pub trait CswTransport: Send + Sync + fmt::Debug {
    /// POST an XML body and return the response body.
    async fn send(&self, body: &str) -> Result<String, TransportError>;
}

/// Production transport over reqwest.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("has_credentials", &self.username.is_some())
            .finish()
    }
}

impl HttpTransport {
    /// Build a transport from a source configuration.
    pub fn from_config(config: &SourceConfiguration) -> Result<Self, TransportError> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.receive_timeout_ms));

        if let Some(path) = &config.client_identity_pem {
            let pem = std::fs::read(path)
                .map_err(|e| TransportError::Identity(format!("reading {path}: {e}")))?;
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| TransportError::Identity(e.to_string()))?;
            builder = builder.identity(identity);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn add_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => req.basic_auth(user, self.password.as_deref()),
            None => req,
        }
    }

    /// Map a reqwest error (network/timeout) to a `TransportError`.
    fn map_network_error(e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Network(format!("connection failed: {e}"))
        } else {
            TransportError::Network(e.to_string())
        }
    }

    /// Map a non-2xx response to a `TransportError`, retaining the body.
    async fn map_error(resp: reqwest::Response) -> TransportError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED => TransportError::Unauthorized,
            StatusCode::FORBIDDEN => TransportError::Forbidden,
            _ => TransportError::Http {
                status: status.as_u16(),
                body,
            },
        }
    }
}

#[async_trait]
impl CswTransport for HttpTransport {
    async fn send(&self, body: &str) -> Result<String, TransportError> {
        let req = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/xml")
            .body(body.to_string());

        let resp = self
            .add_auth(req)
            .send()
            .await
            .map_err(Self::map_network_error)?;

        if !resp.status().is_success() {
            return Err(Self::map_error(resp).await);
        }

        resp.text().await.map_err(Self::map_network_error)
    }
}
