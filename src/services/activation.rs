//! Activation and heartbeat services - the server side of the license protocol.
//!
//! # Activation (first-bind-wins)
//!
//! 1. `try_bind` attempts the atomic unused -> active transition
//! 2. A winner gets `expires_at = now + validity_days` and a fresh token
//! 3. Re-activation from the bound device is an idempotent no-op that
//!    returns a fresh token with the *existing* expiry
//! 4. Activation from any other device is rejected, record untouched
//!
//! # Heartbeat
//!
//! The token alone is never enough: every heartbeat re-validates against
//! live license state so administrative bans take effect immediately rather
//! than waiting for token expiry.
//!
//! Every attempt, accepted or rejected, is appended to the audit log.
//! Audit failures are non-fatal and only warned.

use crate::{
    error::AppError,
    models::audit::{AuditAction, RequestMeta},
    services::store::{BindOutcome, LicenseStore, LiveStatus},
    token::TokenCodec,
};

/// Handle an activation request, returning a signed token on success.
///
/// # Errors
///
/// - `InvalidKey`: unknown license key (no existence leak beyond this)
/// - `Banned` / `Expired`: license in a terminal status
/// - `DeviceMismatch`: license bound to a different hardware id
/// - `Database` / `Token`: store or signing failure (opaque 500)
pub async fn activate<S: LicenseStore>(
    store: &S,
    codec: &TokenCodec,
    key: &str,
    hwid: &str,
    meta: &RequestMeta,
) -> Result<String, AppError> {
    let outcome = store.try_bind(key, hwid).await?;

    let expires_at = match outcome {
        BindOutcome::Bound { expires_at } => {
            tracing::info!(key, expires_at = %expires_at, "license activated");
            expires_at
        }
        BindOutcome::AlreadyBound { expires_at } => {
            tracing::debug!(key, "license already active on this device");
            expires_at
        }
        BindOutcome::Conflict => {
            record(store, key, hwid, AuditAction::Activate, meta, false, "hwid mismatch").await;
            return Err(AppError::DeviceMismatch);
        }
        BindOutcome::NotFound => {
            record(store, key, hwid, AuditAction::Activate, meta, false, "license not found").await;
            return Err(AppError::InvalidKey);
        }
        BindOutcome::Banned => {
            record(store, key, hwid, AuditAction::Activate, meta, false, "license banned").await;
            return Err(AppError::Banned);
        }
        BindOutcome::Expired => {
            record(store, key, hwid, AuditAction::Activate, meta, false, "license expired").await;
            return Err(AppError::Expired);
        }
    };

    // Token expiry mirrors the license's stored expires_at, which is set once
    // at first activation and never recomputed.
    let token = match codec.issue(key, hwid, expires_at) {
        Ok(token) => token,
        Err(err) => {
            tracing::error!(key, error = %err, "failed to issue token");
            record(store, key, hwid, AuditAction::Activate, meta, false, "failed to issue token")
                .await;
            return Err(err.into());
        }
    };

    audit_ok(store, key, hwid, AuditAction::Activate, meta).await;
    Ok(token)
}

/// Handle a heartbeat request for a bearer token.
///
/// Token verification failures map to `Unauthorized` (401); any non-active
/// live status maps to the matching business rejection (403). On success the
/// advisory `last_heartbeat_at` is updated - failures there are only warned,
/// since the field is telemetry, not protocol state.
pub async fn heartbeat<S: LicenseStore>(
    store: &S,
    codec: &TokenCodec,
    token: &str,
    meta: &RequestMeta,
) -> Result<(), AppError> {
    // Signature + numeric expiry only; liveness is checked against the store
    // below even when the token itself is still cryptographically valid.
    let claims = codec.verify(token).map_err(|err| {
        tracing::debug!(error = %err, "heartbeat token rejected");
        AppError::Unauthorized
    })?;

    let key = claims.license_key.as_str();
    let hwid = claims.hwid.as_str();

    match store.check_live(key).await? {
        LiveStatus::Active { hwid: bound, .. } => {
            // The token was authenticated at issuance, but the admin surface
            // can reset and rebind a license, so re-compare defensively.
            if bound != hwid {
                record(store, key, hwid, AuditAction::Heartbeat, meta, false, "hwid mismatch")
                    .await;
                return Err(AppError::DeviceMismatch);
            }
        }
        LiveStatus::NotFound => {
            record(store, key, hwid, AuditAction::Heartbeat, meta, false, "license not found")
                .await;
            return Err(AppError::InvalidKey);
        }
        LiveStatus::Banned => {
            record(store, key, hwid, AuditAction::Heartbeat, meta, false, "license banned").await;
            return Err(AppError::Banned);
        }
        LiveStatus::Expired => {
            record(store, key, hwid, AuditAction::Heartbeat, meta, false, "license expired").await;
            return Err(AppError::Expired);
        }
        LiveStatus::NotUsedYet => {
            record(store, key, hwid, AuditAction::Heartbeat, meta, false, "license not active")
                .await;
            return Err(AppError::NotActive);
        }
    }

    if let Err(err) = store.touch_heartbeat(key).await {
        tracing::warn!(key, error = %err, "failed to update last_heartbeat_at");
    }

    audit_ok(store, key, hwid, AuditAction::Heartbeat, meta).await;
    Ok(())
}

/// Append a failed attempt to the audit log; logging failures are non-fatal.
async fn record<S: LicenseStore>(
    store: &S,
    key: &str,
    hwid: &str,
    action: AuditAction,
    meta: &RequestMeta,
    success: bool,
    reason: &str,
) {
    let reason = if success { None } else { Some(reason) };
    if let Err(err) = store.append_audit(key, hwid, action, meta, success, reason).await {
        tracing::warn!(key, error = %err, "failed to append audit log entry");
    }
}

/// Append a successful attempt to the audit log.
async fn audit_ok<S: LicenseStore>(
    store: &S,
    key: &str,
    hwid: &str,
    action: AuditAction,
    meta: &RequestMeta,
) {
    record(store, key, hwid, action, meta, true, "").await;
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::models::license::LicenseStatus;
    use crate::services::store::testing::{MemoryLicense, MemoryStore};

    const KEY: &str = "AAAA-BBBB-CCCC-DDDD-EEEE";

    fn codec() -> TokenCodec {
        TokenCodec::new(b"service-test-secret")
    }

    fn meta() -> RequestMeta {
        RequestMeta {
            source_addr: "127.0.0.1:55555".to_string(),
            user_agent: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn first_activation_binds_and_sets_expiry() {
        let store = MemoryStore::with_license(KEY, MemoryLicense::unused(30));
        let codec = codec();

        let token = activate(&store, &codec, KEY, "hw-A", &meta()).await.unwrap();

        let row = store.license(KEY);
        assert_eq!(row.status, LicenseStatus::Active);
        assert_eq!(row.hwid.as_deref(), Some("hw-A"));

        // expires_at = activation time + validity_days
        let expires_at = row.expires_at.unwrap();
        let expected = Utc::now() + Duration::days(30);
        assert!((expires_at - expected).num_seconds().abs() < 5);

        // Token claims carry (key, hwid, that expiry)
        let claims = codec.verify(&token).unwrap();
        assert_eq!(claims.license_key, KEY);
        assert_eq!(claims.hwid, "hw-A");
        assert_eq!(claims.exp, expires_at.timestamp());
    }

    #[tokio::test]
    async fn reactivation_same_device_is_idempotent() {
        let store = MemoryStore::with_license(KEY, MemoryLicense::unused(30));
        let codec = codec();

        let first = activate(&store, &codec, KEY, "hw-A", &meta()).await.unwrap();
        let first_exp = codec.verify(&first).unwrap().exp;
        let activated_at = store.license(KEY).activated_at;

        let second = activate(&store, &codec, KEY, "hw-A", &meta()).await.unwrap();
        let second_exp = codec.verify(&second).unwrap().exp;

        // Fresh token, same expiry - no re-extension
        assert_eq!(first_exp, second_exp);
        assert_eq!(store.license(KEY).activated_at, activated_at);
    }

    #[tokio::test]
    async fn activation_from_second_device_is_rejected_without_mutation() {
        let store = MemoryStore::with_license(KEY, MemoryLicense::unused(30));
        let codec = codec();

        activate(&store, &codec, KEY, "hw-A", &meta()).await.unwrap();
        let before = store.license(KEY);

        let err = activate(&store, &codec, KEY, "hw-B", &meta()).await.unwrap_err();
        assert!(matches!(err, AppError::DeviceMismatch));

        let after = store.license(KEY);
        assert_eq!(after.status, before.status);
        assert_eq!(after.hwid, before.hwid);
        assert_eq!(after.expires_at, before.expires_at);
    }

    #[tokio::test]
    async fn unknown_key_is_rejected_as_invalid() {
        let store = MemoryStore::default();
        let err = activate(&store, &codec(), "NOPE", "hw-A", &meta()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidKey));
    }

    #[tokio::test]
    async fn banned_license_cannot_activate() {
        let mut license = MemoryLicense::unused(30);
        license.status = LicenseStatus::Banned;
        let store = MemoryStore::with_license(KEY, license);

        let err = activate(&store, &codec(), KEY, "hw-A", &meta()).await.unwrap_err();
        assert!(matches!(err, AppError::Banned));
    }

    #[tokio::test]
    async fn heartbeat_succeeds_and_touches_timestamp() {
        let store = MemoryStore::with_license(KEY, MemoryLicense::unused(30));
        let codec = codec();
        let token = activate(&store, &codec, KEY, "hw-A", &meta()).await.unwrap();

        heartbeat(&store, &codec, &token, &meta()).await.unwrap();
        assert!(store.license(KEY).last_heartbeat_at.is_some());
    }

    #[tokio::test]
    async fn ban_kills_heartbeat_even_with_valid_token() {
        let store = MemoryStore::with_license(KEY, MemoryLicense::unused(30));
        let codec = codec();
        let token = activate(&store, &codec, KEY, "hw-A", &meta()).await.unwrap();

        // Administrative ban while the token is still cryptographically valid
        store.rows.lock().unwrap().get_mut(KEY).unwrap().status = LicenseStatus::Banned;

        let err = heartbeat(&store, &codec, &token, &meta()).await.unwrap_err();
        assert!(matches!(err, AppError::Banned));
    }

    #[tokio::test]
    async fn elapsed_expiry_flips_status_to_expired() {
        let store = MemoryStore::with_license(KEY, MemoryLicense::unused(30));
        let codec = codec();
        let token = activate(&store, &codec, KEY, "hw-A", &meta()).await.unwrap();

        // Push the stored expiry into the past; the token itself would also
        // be expired by now, so heartbeat with a freshly issued long token
        // exercises the store-side check.
        store.rows.lock().unwrap().get_mut(KEY).unwrap().expires_at =
            Some(Utc::now() - Duration::hours(1));
        let fresh = codec.issue(KEY, "hw-A", Utc::now() + Duration::days(1)).unwrap();

        let err = heartbeat(&store, &codec, &fresh, &meta()).await.unwrap_err();
        assert!(matches!(err, AppError::Expired));

        // The flip is persisted
        assert_eq!(store.license(KEY).status, LicenseStatus::Expired);
        drop(token);
    }

    #[tokio::test]
    async fn garbage_token_is_unauthorized() {
        let store = MemoryStore::with_license(KEY, MemoryLicense::unused(30));
        let err = heartbeat(&store, &codec(), "not-a-token", &meta()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn rebound_license_fails_defensive_hwid_check() {
        let store = MemoryStore::with_license(KEY, MemoryLicense::unused(30));
        let codec = codec();
        let token = activate(&store, &codec, KEY, "hw-A", &meta()).await.unwrap();

        // Admin reset + rebind to another machine while the old token lives
        store.rows.lock().unwrap().get_mut(KEY).unwrap().hwid = Some("hw-B".to_string());

        let err = heartbeat(&store, &codec, &token, &meta()).await.unwrap_err();
        assert!(matches!(err, AppError::DeviceMismatch));
    }

    #[tokio::test]
    async fn every_rejected_attempt_is_audited() {
        let store = MemoryStore::with_license(KEY, MemoryLicense::unused(30));
        let codec = codec();

        activate(&store, &codec, KEY, "hw-A", &meta()).await.unwrap();
        let _ = activate(&store, &codec, KEY, "hw-B", &meta()).await;

        let audits = store.audits.lock().unwrap();
        assert_eq!(audits.len(), 2);
        assert!(audits[0].success);
        assert!(!audits[1].success);
        assert_eq!(audits[1].reason.as_deref(), Some("hwid mismatch"));
        assert_eq!(audits[1].hwid, "hw-B");
    }
}
