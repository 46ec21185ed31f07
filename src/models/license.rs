//! License data model and admin API request/response types.
//!
//! This module defines:
//! - `License`: Database entity representing a license record
//! - `LicenseStatus`: The license lifecycle state machine values
//! - Admin request types for create/batch/update/list operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// License lifecycle status.
///
/// # State Machine
///
/// Status is monotonic for the protocol:
/// `unused -> active -> {expired, banned}`. No path returns to `active`
/// autonomously - only the admin surface may reset a license.
///
/// Stored as the PostgreSQL enum type `license_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "license_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    /// Created but never activated; no hardware binding yet
    Unused,
    /// Bound to exactly one hardware id, within its validity window
    Active,
    /// Validity window passed (set at creation + validity_days from activation)
    Expired,
    /// Administratively revoked; takes effect on the next heartbeat
    Banned,
}

/// Represents a license record from the database.
///
/// # Database Table
///
/// Maps to the `licenses` table. Each license:
/// - Is identified by a unique, immutable `license_key`
/// - Binds to at most one hardware id on first activation
/// - Gets its `expires_at` computed once, at activation time
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct License {
    /// Surrogate primary key
    pub id: i64,

    /// Unique license key, immutable after creation
    pub license_key: String,

    /// Product this license was sold for
    pub product_name: String,

    /// Hardware id bound on first activation; NULL while unused.
    ///
    /// Immutable while the license is active - a second activation from a
    /// different machine is rejected without touching the record.
    pub hwid: Option<String>,

    /// Current lifecycle status
    pub status: LicenseStatus,

    /// Declared device cap.
    ///
    /// Carried in the data model and admin surface, but the activation
    /// protocol implements single-device binding: exactly one hardware id
    /// per license regardless of this value.
    pub max_devices: i32,

    /// Validity window in days, fixed at creation.
    ///
    /// `expires_at` is computed as activation time + this many days, once,
    /// and never recomputed afterward.
    pub validity_days: i32,

    /// Expiry timestamp; NULL until first activation
    pub expires_at: Option<DateTime<Utc>>,

    /// Timestamp of the first successful activation
    pub activated_at: Option<DateTime<Utc>>,

    /// Advisory telemetry: last successful heartbeat.
    ///
    /// Lost updates are acceptable; never protocol-relevant.
    pub last_heartbeat_at: Option<DateTime<Utc>>,

    /// Free-form operator note
    pub note: Option<String>,

    /// Timestamp when the license was created
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last update
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating a single license.
///
/// # JSON Example
///
/// ```json
/// {
///   "key": "TRIAL-0001-AAAA-BBBB-CCCC",
///   "product_name": "Pro Edition",
///   "max_devices": 1,
///   "validity_days": 30,
///   "note": "trial batch"
/// }
/// ```
///
/// Every field is optional: a missing `key` is generated server-side, and
/// the remaining fields fall back to defaults matching the database schema.
#[derive(Debug, Deserialize)]
pub struct CreateLicenseRequest {
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default = "default_product_name")]
    pub product_name: String,

    #[serde(default = "default_max_devices")]
    pub max_devices: i32,

    #[serde(default = "default_validity_days")]
    pub validity_days: i32,

    #[serde(default)]
    pub note: Option<String>,
}

/// Request body for batch license generation.
#[derive(Debug, Deserialize)]
pub struct BatchGenerateRequest {
    /// Number of keys to generate (1..=1000)
    pub count: i32,

    /// Optional prefix prepended to each generated key
    #[serde(default)]
    pub prefix: Option<String>,

    #[serde(default = "default_product_name")]
    pub product_name: String,

    #[serde(default = "default_max_devices")]
    pub max_devices: i32,

    #[serde(default = "default_validity_days")]
    pub validity_days: i32,

    #[serde(default)]
    pub note: Option<String>,
}

/// Request body for partial license updates.
///
/// All fields optional; at least one must be present. Status changes here
/// are the administrative escape hatch from the otherwise monotonic state
/// machine (e.g., banning an active license, or resetting one to unused).
#[derive(Debug, Deserialize)]
pub struct UpdateLicenseRequest {
    #[serde(default)]
    pub status: Option<LicenseStatus>,

    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub max_devices: Option<i32>,
}

impl UpdateLicenseRequest {
    /// True when no field was supplied.
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.expires_at.is_none() && self.max_devices.is_none()
    }
}

/// Query parameters for listing licenses.
#[derive(Debug, Deserialize)]
pub struct ListLicensesQuery {
    #[serde(default)]
    pub status: Option<LicenseStatus>,

    #[serde(default)]
    pub product: Option<String>,
}

/// Per-status license counts for the stats endpoint.
#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct LicenseCounts {
    pub total: i64,
    pub unused: i64,
    pub active: i64,
    pub expired: i64,
    pub banned: i64,
}

/// Response body for the stats endpoint.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub licenses: LicenseCounts,

    /// Successful activations since midnight (server time)
    pub today_activations: i64,
}

fn default_product_name() -> String {
    "Default Product".to_string()
}

fn default_max_devices() -> i32 {
    1
}

fn default_validity_days() -> i32 {
    365
}
