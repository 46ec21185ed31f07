//! Wire protocol types for the activation/heartbeat endpoints.
//!
//! These shapes are shared verbatim by the server handlers and the
//! [`crate::client::ProtocolClient`], so the two sides cannot drift apart.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/activate`.
///
/// # JSON Example
///
/// ```json
/// {
///   "key": "AAAA-BBBB-CCCC-DDDD-EEEE",
///   "hwid": "3f786850e387550f..."
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateRequest {
    pub key: String,
    pub hwid: String,
}

/// Response of `POST /api/activate`.
///
/// `status` is `"success"` with a token on 200, or `"error"` with a
/// human-readable reason on any 4xx/5xx.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateResponse {
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActivateResponse {
    /// Successful activation carrying a freshly issued token.
    pub fn success(token: String) -> Self {
        Self {
            status: "success".to_string(),
            token: Some(token),
            error: None,
        }
    }
}

/// Response of `POST /api/heartbeat`: `{"status": "alive"}` or `{"status": "dead"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub status: String,
}

impl HeartbeatResponse {
    pub fn alive() -> Self {
        Self {
            status: "alive".to_string(),
        }
    }

    pub fn dead() -> Self {
        Self {
            status: "dead".to_string(),
        }
    }
}
