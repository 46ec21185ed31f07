//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Delegates to the protocol services or runs admin queries
//! 3. Returns HTTP response (JSON, status code)

/// Administrative license CRUD endpoints
pub mod admin;
/// Health check endpoint
pub mod health;
/// Activation and heartbeat protocol endpoints
pub mod protocol;
