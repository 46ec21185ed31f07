//! Administrative license management handlers.
//!
//! This module implements the license CRUD endpoints consumed by back-office
//! tooling:
//! - POST /api/admin/licenses - create a license
//! - POST /api/admin/licenses/batch - batch generate licenses
//! - GET /api/admin/licenses - list licenses (optional status filter)
//! - GET /api/admin/licenses/:key - license detail with recent audit entries
//! - PUT /api/admin/licenses/:key - partial update (status/expiry/device cap)
//! - DELETE /api/admin/licenses/:key - delete a license
//! - GET /api/admin/stats - aggregate counts
//!
//! These are plain CRUD against the license table; the protocol invariants
//! live entirely in the activation path. Changing a status here is the one
//! sanctioned way out of the monotonic protocol state machine.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Serialize;

use crate::{
    AppState,
    error::{AppError, AppJson},
    models::{
        audit::ActivationLog,
        license::{
            BatchGenerateRequest, CreateLicenseRequest, License, LicenseCounts, ListLicensesQuery,
            StatsResponse, UpdateLicenseRequest,
        },
    },
};

/// Response body for batch generation.
#[derive(Debug, Serialize)]
pub struct BatchGenerateResponse {
    /// Keys successfully inserted
    pub licenses: Vec<String>,
    pub success: i32,
    pub failed: i32,
    pub total: i32,
}

/// Response body for the license detail endpoint.
#[derive(Debug, Serialize)]
pub struct LicenseDetailResponse {
    pub license: License,

    /// Most recent audit entries for this key (newest first, max 50)
    pub logs: Vec<ActivationLog>,
}

/// Create a single license in `unused` state.
///
/// A missing `key` is generated server-side in `XXXX-XXXX-XXXX-XXXX-XXXX`
/// form. `expires_at` is deliberately left NULL - it is computed at first
/// activation, not at creation.
pub async fn create_license(
    State(state): State<AppState>,
    AppJson(request): AppJson<CreateLicenseRequest>,
) -> Result<Json<License>, AppError> {
    let key = match request.key {
        Some(key) if !key.trim().is_empty() => key.trim().to_string(),
        _ => generate_license_key(),
    };

    // Out-of-range values fall back to the standard defaults rather than
    // erroring, matching the batch path.
    let max_devices = if request.max_devices >= 1 { request.max_devices } else { 1 };
    let validity_days = if request.validity_days >= 1 { request.validity_days } else { 365 };

    let license = sqlx::query_as::<_, License>(
        r#"
        INSERT INTO licenses (license_key, product_name, max_devices, validity_days, note)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(&key)
    .bind(&request.product_name)
    .bind(max_devices)
    .bind(validity_days)
    .bind(&request.note)
    .fetch_one(&state.pool)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            AppError::InvalidRequest("license key already exists".to_string())
        } else {
            err.into()
        }
    })?;

    tracing::info!(key, validity_days, "license created");
    Ok(Json(license))
}

/// Batch generate licenses with a shared configuration.
///
/// Individual insert failures (e.g., a freak key collision) are tolerated
/// and counted rather than aborting the batch.
pub async fn batch_generate(
    State(state): State<AppState>,
    AppJson(request): AppJson<BatchGenerateRequest>,
) -> Result<Json<BatchGenerateResponse>, AppError> {
    if request.count < 1 || request.count > 1000 {
        return Err(AppError::InvalidRequest(
            "count must be between 1 and 1000".to_string(),
        ));
    }

    let max_devices = if request.max_devices >= 1 { request.max_devices } else { 1 };
    let validity_days = if request.validity_days >= 1 { request.validity_days } else { 365 };
    let prefix = request.prefix.as_deref().map(str::trim).filter(|p| !p.is_empty());

    let mut licenses = Vec::with_capacity(request.count as usize);
    let mut failed = 0;

    for _ in 0..request.count {
        let key = match prefix {
            Some(prefix) => format!("{}-{}", prefix, generate_license_key()),
            None => generate_license_key(),
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO licenses (license_key, product_name, max_devices, validity_days, note)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&key)
        .bind(&request.product_name)
        .bind(max_devices)
        .bind(validity_days)
        .bind(&request.note)
        .execute(&state.pool)
        .await;

        match inserted {
            Ok(_) => licenses.push(key),
            Err(err) => {
                tracing::warn!(key, error = %err, "batch insert failed for key");
                failed += 1;
            }
        }
    }

    tracing::info!(
        generated = licenses.len(),
        failed,
        "batch license generation complete"
    );

    Ok(Json(BatchGenerateResponse {
        success: licenses.len() as i32,
        failed,
        total: request.count,
        licenses,
    }))
}

/// List licenses, newest first, optionally filtered by status or product.
///
/// Capped at 100 rows; this is an operator convenience view, not a paging API.
pub async fn list_licenses(
    State(state): State<AppState>,
    Query(query): Query<ListLicensesQuery>,
) -> Result<Json<Vec<License>>, AppError> {
    let licenses = sqlx::query_as::<_, License>(
        r#"
        SELECT * FROM licenses
        WHERE ($1::license_status IS NULL OR status = $1)
          AND ($2::text IS NULL OR product_name = $2)
        ORDER BY created_at DESC
        LIMIT 100
        "#,
    )
    .bind(query.status)
    .bind(query.product)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(licenses))
}

/// Fetch one license with its recent audit trail.
pub async fn get_license(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<LicenseDetailResponse>, AppError> {
    let license = sqlx::query_as::<_, License>("SELECT * FROM licenses WHERE license_key = $1")
        .bind(&key)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::NotFound)?;

    let logs = sqlx::query_as::<_, ActivationLog>(
        r#"
        SELECT * FROM activation_logs
        WHERE license_key = $1
        ORDER BY created_at DESC
        LIMIT 50
        "#,
    )
    .bind(&key)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(LicenseDetailResponse { license, logs }))
}

/// Partially update a license's status, expiry, or device cap.
pub async fn update_license(
    State(state): State<AppState>,
    Path(key): Path<String>,
    AppJson(request): AppJson<UpdateLicenseRequest>,
) -> Result<Json<License>, AppError> {
    if request.is_empty() {
        return Err(AppError::InvalidRequest("no fields to update".to_string()));
    }

    if matches!(request.max_devices, Some(n) if n < 1) {
        return Err(AppError::InvalidRequest(
            "max_devices must be at least 1".to_string(),
        ));
    }

    // COALESCE keeps unspecified columns untouched in a single statement
    let license = sqlx::query_as::<_, License>(
        r#"
        UPDATE licenses
        SET status = COALESCE($2, status),
            expires_at = COALESCE($3, expires_at),
            max_devices = COALESCE($4, max_devices),
            updated_at = NOW()
        WHERE license_key = $1
        RETURNING *
        "#,
    )
    .bind(&key)
    .bind(request.status)
    .bind(request.expires_at)
    .bind(request.max_devices)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound)?;

    tracing::info!(key, "license updated");
    Ok(Json(license))
}

/// Delete a license. The audit trail is kept.
pub async fn delete_license(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = sqlx::query("DELETE FROM licenses WHERE license_key = $1")
        .bind(&key)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    tracing::info!(key, "license deleted");
    Ok(Json(serde_json::json!({
        "message": "License deleted successfully"
    })))
}

/// Aggregate per-status counts plus today's successful activations.
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let licenses = sqlx::query_as::<_, LicenseCounts>(
        r#"
        SELECT COUNT(*) AS total,
               COUNT(*) FILTER (WHERE status = 'unused') AS unused,
               COUNT(*) FILTER (WHERE status = 'active') AS active,
               COUNT(*) FILTER (WHERE status = 'expired') AS expired,
               COUNT(*) FILTER (WHERE status = 'banned') AS banned
        FROM licenses
        "#,
    )
    .fetch_one(&state.pool)
    .await?;

    let today_activations: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM activation_logs
        WHERE action = 'activate' AND success
          AND created_at >= date_trunc('day', NOW())
        "#,
    )
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(StatsResponse {
        licenses,
        today_activations,
    }))
}

/// Generate a license key in `XXXX-XXXX-XXXX-XXXX-XXXX` form
/// (20 upper-hex characters from 10 random bytes).
fn generate_license_key() -> String {
    let bytes: [u8; 10] = rand::random();
    let hex = hex::encode_upper(bytes);

    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..4],
        &hex[4..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20]
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_have_expected_shape() {
        let key = generate_license_key();
        let groups: Vec<&str> = key.split('-').collect();

        assert_eq!(groups.len(), 5);
        for group in groups {
            assert_eq!(group.len(), 4);
            assert!(group.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn generated_keys_are_not_repeated() {
        let a = generate_license_key();
        let b = generate_license_key();
        assert_ne!(a, b);
    }
}
