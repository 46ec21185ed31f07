//! License state store - persisted license records and atomic status transitions.
//!
//! The store exposes the two operations the protocol depends on, `try_bind`
//! and `check_live`, behind the [`LicenseStore`] trait so the activation and
//! heartbeat services can be exercised against an in-memory store in tests.
//! The production implementation is [`PgLicenseStore`], a thin borrow of the
//! shared connection pool.
//!
//! # Atomicity
//!
//! The only contended resource is a single license row during its
//! unused -> active transition. `try_bind` therefore performs the transition
//! as one conditional UPDATE guarded by the current status (compare-and-swap):
//! of two concurrent first activations, only the caller whose UPDATE changed
//! the row proceeds as the binder; the loser re-reads the committed row and is
//! classified as a same- or different-device activation. Everything else
//! (expiry flips, heartbeat timestamps) is idempotent enough for plain
//! row-level consistency.

use chrono::{DateTime, Utc};

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        audit::{AuditAction, RequestMeta},
        license::LicenseStatus,
    },
};

/// Result of an activation bind attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum BindOutcome {
    /// This caller won the unused -> active transition
    Bound { expires_at: DateTime<Utc> },

    /// License was already active and bound to the same hardware id
    /// (idempotent re-activation; the existing expiry is returned unchanged)
    AlreadyBound { expires_at: DateTime<Utc> },

    /// License is active on a different hardware id; record unchanged
    Conflict,

    /// No license row for this key
    NotFound,

    /// License is banned
    Banned,

    /// License is expired (stored status, or live check against expires_at)
    Expired,
}

/// Result of a liveness check against the stored license state.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveStatus {
    /// License is active; carries the bound hardware id and expiry
    Active {
        hwid: String,
        expires_at: Option<DateTime<Utc>>,
    },

    /// License exists but was never activated
    NotUsedYet,

    Banned,

    Expired,

    NotFound,
}

/// Storage operations used by the activation and heartbeat services.
///
/// The admin CRUD surface deliberately does not go through this trait - it is
/// plain SQL against the same table, with none of the protocol's invariants.
pub trait LicenseStore {
    /// Attempt the unused -> active transition, binding `hwid` and computing
    /// `expires_at = now + validity_days`. Must be atomic per the module docs.
    fn try_bind(
        &self,
        key: &str,
        hwid: &str,
    ) -> impl Future<Output = Result<BindOutcome, AppError>> + Send;

    /// Report the license's live status, flipping an overdue `active` row to
    /// `expired` before returning.
    fn check_live(&self, key: &str) -> impl Future<Output = Result<LiveStatus, AppError>> + Send;

    /// Record a successful heartbeat. Advisory only; lost updates are fine.
    fn touch_heartbeat(&self, key: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Append one attempt to the audit log.
    fn append_audit(
        &self,
        key: &str,
        hwid: &str,
        action: AuditAction,
        meta: &RequestMeta,
        success: bool,
        reason: Option<&str>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// PostgreSQL-backed license store borrowing the shared pool.
pub struct PgLicenseStore<'a> {
    pool: &'a DbPool,
}

impl<'a> PgLicenseStore<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Flip an active row whose expiry has passed to `expired`.
    ///
    /// Run before both bind and liveness reads so the status a caller
    /// observes is always the committed, time-corrected one.
    async fn expire_overdue(&self, key: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE licenses
            SET status = 'expired', updated_at = NOW()
            WHERE license_key = $1 AND status = 'active'
              AND expires_at IS NOT NULL AND expires_at < NOW()
            "#,
        )
        .bind(key)
        .execute(self.pool)
        .await?;

        Ok(())
    }
}

impl LicenseStore for PgLicenseStore<'_> {
    async fn try_bind(&self, key: &str, hwid: &str) -> Result<BindOutcome, AppError> {
        self.expire_overdue(key).await?;

        // Compare-and-swap: the status guard in the WHERE clause ensures at
        // most one concurrent caller binds an unused license.
        let bound: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            UPDATE licenses
            SET hwid = $2,
                status = 'active',
                activated_at = NOW(),
                expires_at = NOW() + make_interval(days => validity_days),
                updated_at = NOW()
            WHERE license_key = $1 AND status = 'unused'
            RETURNING expires_at
            "#,
        )
        .bind(key)
        .bind(hwid)
        .fetch_optional(self.pool)
        .await?;

        if let Some(expires_at) = bound {
            return Ok(BindOutcome::Bound { expires_at });
        }

        // Lost the swap (or the license was never unused): classify from the
        // committed row.
        let row: Option<(LicenseStatus, Option<String>, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT status, hwid, expires_at FROM licenses WHERE license_key = $1",
        )
        .bind(key)
        .fetch_optional(self.pool)
        .await?;

        match row {
            None => Ok(BindOutcome::NotFound),
            Some((LicenseStatus::Banned, _, _)) => Ok(BindOutcome::Banned),
            Some((LicenseStatus::Expired, _, _)) => Ok(BindOutcome::Expired),
            Some((LicenseStatus::Active, Some(bound_hwid), Some(expires_at)))
                if bound_hwid == hwid =>
            {
                Ok(BindOutcome::AlreadyBound { expires_at })
            }
            Some((LicenseStatus::Active, _, _)) => Ok(BindOutcome::Conflict),
            // The row read back as unused even though our guarded UPDATE
            // missed it: an admin reset raced us. Surface as internal rather
            // than guess at a bind we did not make.
            Some((LicenseStatus::Unused, _, _)) => Err(AppError::Internal),
        }
    }

    async fn check_live(&self, key: &str) -> Result<LiveStatus, AppError> {
        self.expire_overdue(key).await?;

        let row: Option<(LicenseStatus, Option<String>, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT status, hwid, expires_at FROM licenses WHERE license_key = $1",
        )
        .bind(key)
        .fetch_optional(self.pool)
        .await?;

        Ok(match row {
            None => LiveStatus::NotFound,
            Some((LicenseStatus::Unused, _, _)) => LiveStatus::NotUsedYet,
            Some((LicenseStatus::Banned, _, _)) => LiveStatus::Banned,
            Some((LicenseStatus::Expired, _, _)) => LiveStatus::Expired,
            Some((LicenseStatus::Active, hwid, expires_at)) => LiveStatus::Active {
                hwid: hwid.unwrap_or_default(),
                expires_at,
            },
        })
    }

    async fn touch_heartbeat(&self, key: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE licenses SET last_heartbeat_at = NOW() WHERE license_key = $1")
            .bind(key)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    async fn append_audit(
        &self,
        key: &str,
        hwid: &str,
        action: AuditAction,
        meta: &RequestMeta,
        success: bool,
        reason: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO activation_logs
                (license_key, hwid, action, ip_address, user_agent, success, error_msg)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(key)
        .bind(hwid)
        .bind(action.as_str())
        .bind(&meta.source_addr)
        .bind(&meta.user_agent)
        .bind(success)
        .bind(reason)
        .execute(self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    //! In-memory store for exercising the activation/heartbeat services
    //! without a database. The single mutex makes every operation atomic,
    //! matching the row-level guarantees of the Postgres implementation.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::Duration;

    use super::*;

    #[derive(Debug, Clone)]
    pub struct MemoryLicense {
        pub status: LicenseStatus,
        pub hwid: Option<String>,
        pub validity_days: i64,
        pub expires_at: Option<DateTime<Utc>>,
        pub activated_at: Option<DateTime<Utc>>,
        pub last_heartbeat_at: Option<DateTime<Utc>>,
    }

    impl MemoryLicense {
        pub fn unused(validity_days: i64) -> Self {
            Self {
                status: LicenseStatus::Unused,
                hwid: None,
                validity_days,
                expires_at: None,
                activated_at: None,
                last_heartbeat_at: None,
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct AuditRecord {
        pub key: String,
        pub hwid: String,
        pub action: AuditAction,
        pub success: bool,
        pub reason: Option<String>,
    }

    #[derive(Default)]
    pub struct MemoryStore {
        pub rows: Mutex<HashMap<String, MemoryLicense>>,
        pub audits: Mutex<Vec<AuditRecord>>,
    }

    impl MemoryStore {
        pub fn with_license(key: &str, license: MemoryLicense) -> Self {
            let store = Self::default();
            store.rows.lock().unwrap().insert(key.to_string(), license);
            store
        }

        pub fn license(&self, key: &str) -> MemoryLicense {
            self.rows.lock().unwrap().get(key).cloned().unwrap()
        }
    }

    fn expire_if_overdue(row: &mut MemoryLicense) {
        if row.status == LicenseStatus::Active
            && row.expires_at.is_some_and(|at| at < Utc::now())
        {
            row.status = LicenseStatus::Expired;
        }
    }

    impl LicenseStore for MemoryStore {
        async fn try_bind(&self, key: &str, hwid: &str) -> Result<BindOutcome, AppError> {
            let mut rows = self.rows.lock().unwrap();
            let Some(row) = rows.get_mut(key) else {
                return Ok(BindOutcome::NotFound);
            };
            expire_if_overdue(row);

            Ok(match row.status {
                LicenseStatus::Banned => BindOutcome::Banned,
                LicenseStatus::Expired => BindOutcome::Expired,
                LicenseStatus::Unused => {
                    let now = Utc::now();
                    let expires_at = now + Duration::days(row.validity_days);
                    row.status = LicenseStatus::Active;
                    row.hwid = Some(hwid.to_string());
                    row.activated_at = Some(now);
                    row.expires_at = Some(expires_at);
                    BindOutcome::Bound { expires_at }
                }
                LicenseStatus::Active => match (&row.hwid, row.expires_at) {
                    (Some(bound), Some(expires_at)) if bound == hwid => {
                        BindOutcome::AlreadyBound { expires_at }
                    }
                    _ => BindOutcome::Conflict,
                },
            })
        }

        async fn check_live(&self, key: &str) -> Result<LiveStatus, AppError> {
            let mut rows = self.rows.lock().unwrap();
            let Some(row) = rows.get_mut(key) else {
                return Ok(LiveStatus::NotFound);
            };
            expire_if_overdue(row);

            Ok(match row.status {
                LicenseStatus::Unused => LiveStatus::NotUsedYet,
                LicenseStatus::Banned => LiveStatus::Banned,
                LicenseStatus::Expired => LiveStatus::Expired,
                LicenseStatus::Active => LiveStatus::Active {
                    hwid: row.hwid.clone().unwrap_or_default(),
                    expires_at: row.expires_at,
                },
            })
        }

        async fn touch_heartbeat(&self, key: &str) -> Result<(), AppError> {
            if let Some(row) = self.rows.lock().unwrap().get_mut(key) {
                row.last_heartbeat_at = Some(Utc::now());
            }
            Ok(())
        }

        async fn append_audit(
            &self,
            key: &str,
            hwid: &str,
            action: AuditAction,
            _meta: &RequestMeta,
            success: bool,
            reason: Option<&str>,
        ) -> Result<(), AppError> {
            self.audits.lock().unwrap().push(AuditRecord {
                key: key.to_string(),
                hwid: hwid.to_string(),
                action,
                success,
                reason: reason.map(str::to_string),
            });
            Ok(())
        }
    }
}
