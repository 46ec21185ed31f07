//! License Guard - hardware-bound license activation and heartbeat service.
//!
//! A license server issues, binds, and continuously revalidates software
//! licenses against specific machines; a client activates once at startup,
//! receives a signed token, and proves liveness on a schedule, terminating
//! itself if validation repeatedly fails.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Tokens**: HS256 JWTs with a server-only symmetric key
//! - **Format**: JSON requests/responses
//!
//! # Server side
//!
//! [`services::store`] owns the license state machine (unused -> active ->
//! expired/banned) with an atomic first-bind-wins activation;
//! [`services::activation`] implements the activation and heartbeat
//! protocol on top of it; [`handlers`] expose both plus the admin CRUD
//! surface over HTTP.
//!
//! # Client side
//!
//! [`client::ProtocolClient`] performs the calls and holds the token;
//! [`monitor::HeartbeatMonitor`] schedules heartbeats with bounded retry
//! and fires the kill switch when a whole tick fails; [`hwid`] supplies the
//! opaque hardware fingerprint.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod hwid;
pub mod models;
pub mod monitor;
pub mod services;
pub mod token;

use db::DbPool;
use token::TokenCodec;

/// Shared state handed to every server handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub codec: TokenCodec,
}
