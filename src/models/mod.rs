//! Data models representing database entities and wire types.
//!
//! This module contains all data structures that map to database tables,
//! plus the JSON request/response shapes shared by server and client.

/// Activation audit log model
pub mod audit;
/// License entity and admin request/response types
pub mod license;
/// Activation/heartbeat wire protocol types
pub mod protocol;
