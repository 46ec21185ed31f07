//! Activation audit log model.
//!
//! Every activation and heartbeat attempt - accepted or rejected - is
//! appended to the `activation_logs` table. The trail is audit-only: the
//! protocol logic never reads it back.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Which protocol operation an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Activate,
    Heartbeat,
}

impl AuditAction {
    /// Value stored in the `action` column.
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Activate => "activate",
            AuditAction::Heartbeat => "heartbeat",
        }
    }
}

/// Request metadata recorded alongside each attempt.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// Remote socket address as seen by the server
    pub source_addr: String,

    /// Caller-supplied User-Agent header (empty when absent)
    pub user_agent: String,
}

/// Represents an activation log record from the database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ActivationLog {
    pub id: i64,
    pub license_key: String,
    pub hwid: Option<String>,
    pub action: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub error_msg: Option<String>,
    pub created_at: DateTime<Utc>,
}
