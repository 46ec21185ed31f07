//! Activation and heartbeat protocol handlers.
//!
//! This module implements the two client-facing endpoints:
//! - POST /api/activate - bind a license to a hardware id, issue a token
//! - POST /api/heartbeat - re-validate a previously issued token
//!
//! Both record the caller's address and User-Agent in the audit log.

use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};

use crate::{
    AppState,
    error::{AppError, AppJson},
    models::{
        audit::RequestMeta,
        protocol::{ActivateRequest, ActivateResponse, HeartbeatResponse},
    },
    services::{activation, store::PgLicenseStore},
};

/// Activate a license for the requesting machine.
///
/// # Endpoint
///
/// `POST /api/activate`
///
/// # Request Body
///
/// ```json
/// {
///   "key": "AAAA-BBBB-CCCC-DDDD-EEEE",
///   "hwid": "3f786850e387550f..."
/// }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: `{"status":"success","token":"<jwt>"}`
/// - **Error (400)**: malformed body (wrong shape, broken JSON, missing
///   content type - all reported in the same JSON error shape)
/// - **Error (403)**: invalid/banned/expired key, or bound to another device
/// - **Error (500)**: store or signing failure
pub async fn activate(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    AppJson(request): AppJson<ActivateRequest>,
) -> Result<Json<ActivateResponse>, AppError> {
    if request.key.trim().is_empty() || request.hwid.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "key and hwid are required".to_string(),
        ));
    }

    let store = PgLicenseStore::new(&state.pool);
    let meta = request_meta(addr, &headers);

    let token =
        activation::activate(&store, &state.codec, &request.key, &request.hwid, &meta).await?;

    Ok(Json(ActivateResponse::success(token)))
}

/// Prove liveness for a previously issued token.
///
/// # Endpoint
///
/// `POST /api/heartbeat` with `Authorization: Bearer <token>`
///
/// # Response
///
/// - **200**: `{"status":"alive"}`
/// - **401**: `{"status":"dead"}` - missing/invalid/expired token
/// - **403**: `{"status":"dead"}` - license not active/expired/banned
pub async fn heartbeat(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    // Extract the bearer token; a missing or malformed header is 401 without
    // ever touching the store.
    let Some(token) = bearer_token(&headers) else {
        return (StatusCode::UNAUTHORIZED, Json(HeartbeatResponse::dead()));
    };

    let store = PgLicenseStore::new(&state.pool);
    let meta = request_meta(addr, &headers);

    match activation::heartbeat(&store, &state.codec, token, &meta).await {
        Ok(()) => (StatusCode::OK, Json(HeartbeatResponse::alive())),
        Err(AppError::Unauthorized) => {
            (StatusCode::UNAUTHORIZED, Json(HeartbeatResponse::dead()))
        }
        Err(err) => {
            // Store failures included: a dead response is the opaque failure
            // surface for this endpoint, details stay in the server log.
            if matches!(err, AppError::Database(_) | AppError::Internal) {
                tracing::error!(error = %err, "heartbeat check failed internally");
            }
            (StatusCode::FORBIDDEN, Json(HeartbeatResponse::dead()))
        }
    }
}

/// Pull `Bearer <token>` out of the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Capture audit metadata from the request.
fn request_meta(addr: SocketAddr, headers: &HeaderMap) -> RequestMeta {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    RequestMeta {
        source_addr: addr.to_string(),
        user_agent,
    }
}
