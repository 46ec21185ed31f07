//! Error types and HTTP error response handling.
//!
//! This module defines all server-side application errors and how they are
//! converted into HTTP responses with appropriate status codes and JSON bodies.
//! The client-side error taxonomy lives in [`crate::client`].

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type for the license server.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Token Errors**: Failures while signing a license token
/// - **Business Rule Rejections**: Unknown, banned, expired, or
///   already-bound licenses (never retried by the protocol layer)
/// - **Authentication Errors**: Missing, malformed, or expired tokens
/// - **Validation Errors**: Invalid request data
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// This wraps any sqlx::Error using the `#[from]` attribute, which
    /// automatically implements `From<sqlx::Error> for AppError`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Signing a license token failed.
    ///
    /// Only issuance errors surface here; verification failures are mapped
    /// to [`AppError::Unauthorized`] so no crypto details leak to clients.
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// The license key does not exist.
    ///
    /// Deliberately reported with the same status and wording as other
    /// protocol rejections so callers cannot probe which keys exist.
    #[error("Invalid license key")]
    InvalidKey,

    /// The license has been banned administratively.
    #[error("License has been banned")]
    Banned,

    /// The license validity window has passed.
    #[error("License has expired")]
    Expired,

    /// The license is bound to a different hardware id.
    #[error("License already activated on another device")]
    DeviceMismatch,

    /// Heartbeat for a license that was never activated.
    #[error("License is not active")]
    NotActive,

    /// Bearer token missing, malformed, tampered, or past its expiry.
    #[error("Invalid or expired token")]
    Unauthorized,

    /// Admin lookup for a license key that does not exist.
    ///
    /// Unlike [`AppError::InvalidKey`] this is an honest 404; the admin
    /// surface has no enumeration concern.
    #[error("License not found")]
    NotFound,

    /// Request body or parameters are invalid.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// Invariant violation inside the store (e.g., a bind race that could
    /// not be classified). Details stay server-side.
    #[error("Internal server error")]
    Internal,
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in the wire format shared with the client:
/// ```json
/// {
///   "status": "error",
///   "error": "Human-readable error message"
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `InvalidKey` / `Banned` / `Expired` / `DeviceMismatch` / `NotActive` → 403 Forbidden
/// - `Unauthorized` → 401 Unauthorized
/// - `NotFound` → 404 Not Found
/// - `InvalidRequest` → 400 Bad Request
/// - `Database` / `Token` / `Internal` → 500 Internal Server Error (hides details from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InvalidKey
            | AppError::Banned
            | AppError::Expired
            | AppError::DeviceMismatch
            | AppError::NotActive => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::InvalidRequest(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Database(_) | AppError::Token(_) | AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        // Build JSON response body
        let body = Json(json!({
            "status": "error",
            "error": message
        }));

        (status, body).into_response()
    }
}

/// JSON body extractor that reports malformed bodies in the wire error shape.
///
/// Axum's stock `Json` rejections answer with plain-text bodies and a mix of
/// status codes: 422 for a body that fails deserialization (e.g., a missing
/// field), 415 for a missing JSON content type, 400 only for broken syntax.
/// The protocol promises `400 {"status":"error","error":…}` for every
/// malformed request body, so body-taking handlers use this wrapper instead
/// of `Json` directly.
#[derive(Debug)]
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::InvalidRequest(rejection.body_text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::header;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Payload {
        key: String,
        hwid: String,
    }

    fn post(content_type: Option<&str>, body: &str) -> Request {
        let mut builder = axum::http::Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder.body(Body::from(body.to_owned())).unwrap()
    }

    async fn extract(request: Request) -> Result<AppJson<Payload>, AppError> {
        AppJson::from_request(request, &()).await
    }

    async fn error_response(err: AppError) -> (StatusCode, String) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn body_missing_a_field_is_a_400_in_the_wire_error_shape() {
        let err = extract(post(Some("application/json"), r#"{"key": "AAAA"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        let (status, body) = error_response(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains(r#""status":"error""#));
        assert!(body.contains(r#""error":"#));
    }

    #[tokio::test]
    async fn broken_json_syntax_is_a_400() {
        let err = extract(post(Some("application/json"), r#"{"key": "#))
            .await
            .unwrap_err();

        let (status, body) = error_response(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains(r#""status":"error""#));
    }

    #[tokio::test]
    async fn missing_content_type_is_a_400() {
        let err = extract(post(None, r#"{"key": "a", "hwid": "b"}"#))
            .await
            .unwrap_err();

        let (status, _) = error_response(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn well_formed_body_extracts_the_payload() {
        let AppJson(payload) = extract(post(Some("application/json"), r#"{"key": "a", "hwid": "b"}"#))
            .await
            .unwrap();

        assert_eq!(payload.key, "a");
        assert_eq!(payload.hwid, "b");
    }
}
