//! Client-side protocol client.
//!
//! [`ProtocolClient`] issues the activation and heartbeat calls against the
//! license server and holds the current token. The token lives inside the
//! client instance - there is no global state - and stays unset until an
//! activation succeeds.

use std::time::Duration;

use reqwest::StatusCode;

use crate::models::protocol::{ActivateRequest, ActivateResponse, HeartbeatResponse};

/// User-Agent sent with every protocol call; also lands in the audit log.
const USER_AGENT: &str = concat!("license-guard-client/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout for protocol calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client-observed protocol failures.
///
/// The split matters to the heartbeat monitor's policy: only failures a
/// retry could plausibly fix are worth retrying, but the monitor retries
/// every failure within a tick and escalates on exhaustion either way. What
/// the taxonomy really buys is precise reporting before the kill switch.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport or decode failure (connection refused, timeout, bad JSON)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Server reachable but unhealthy (unexpected non-2xx, e.g. 500)
    #[error("server unavailable (status {0})")]
    Unavailable(u16),

    /// Activation rejected by the server (bad key, banned, bound elsewhere)
    #[error("activation rejected: {0}")]
    Rejected(String),

    /// Heartbeat rejected: the server has declared this license dead
    #[error("license invalidated: {0}")]
    Invalidated(String),

    /// Heartbeat attempted before a successful activation; never hits the wire
    #[error("no token held, activate first")]
    NotActivated,

    /// Structurally valid HTTP, semantically broken response body
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Issues activation/heartbeat calls and holds the current token.
pub struct ProtocolClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ProtocolClient {
    /// Create a client for the given server base URL (no trailing slash needed).
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self {
            http,
            base_url,
            token: None,
        })
    }

    /// Activate a license for this machine.
    ///
    /// On success the returned token is stored for subsequent heartbeats.
    /// On any transport, decode, or logical failure the token stays unset.
    pub async fn activate(&mut self, key: &str, hwid: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .post(format!("{}/api/activate", self.base_url))
            .json(&ActivateRequest {
                key: key.to_string(),
                hwid: hwid.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Prefer the server's reason when the body parses
            let reason = response
                .json::<ActivateResponse>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| format!("status code {}", status.as_u16()));

            return Err(if status.is_client_error() {
                ClientError::Rejected(reason)
            } else {
                ClientError::Unavailable(status.as_u16())
            });
        }

        let body: ActivateResponse = response.json().await?;
        if body.status != "success" {
            return Err(ClientError::Protocol(format!(
                "unexpected activation status {:?}",
                body.status
            )));
        }

        match body.token {
            Some(token) if !token.is_empty() => {
                self.token = Some(token);
                Ok(())
            }
            _ => Err(ClientError::Protocol(
                "no token in activation response".to_string(),
            )),
        }
    }

    /// Prove liveness with the held token.
    ///
    /// Fails locally with [`ClientError::NotActivated`] when no token is
    /// held - the server is never contacted in that case. A 401/403 or a
    /// non-"alive" body means the server has invalidated the license; any
    /// other non-2xx or transport failure is a network-class error.
    pub async fn heartbeat(&self) -> Result<(), ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::NotActivated)?;

        let response = self
            .http
            .post(format!("{}/api/heartbeat", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ClientError::Invalidated(format!(
                "server reported license dead (status {})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(ClientError::Unavailable(status.as_u16()));
        }

        let body: HeartbeatResponse = response.json().await?;
        if body.status != "alive" {
            return Err(ClientError::Invalidated(format!(
                "unexpected heartbeat status {:?}",
                body.status
            )));
        }

        Ok(())
    }

    /// The currently held token, if activation has succeeded.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Whether this client holds a token.
    pub fn is_activated(&self) -> bool {
        self.token.is_some()
    }
}

impl crate::monitor::HeartbeatClient for ProtocolClient {
    async fn heartbeat(&self) -> Result<(), ClientError> {
        ProtocolClient::heartbeat(self).await
    }
}
