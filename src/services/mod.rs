//! Business logic services.
//!
//! Services contain core protocol logic separated from HTTP handlers:
//! the license state store and the activation/heartbeat state machine.

pub mod activation;
pub mod store;
