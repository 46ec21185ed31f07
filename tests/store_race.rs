//! Postgres-backed store tests.
//!
//! These need a real database, so they are ignored by default. Run them with
//! `DATABASE_URL` pointing at a scratch database:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/license_guard_test cargo test -- --ignored
//! ```

use license_guard::db::{self, DbPool};
use license_guard::services::store::{BindOutcome, LicenseStore, PgLicenseStore};

async fn test_pool() -> DbPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
    let pool = db::create_pool(&url).await.expect("failed to connect");
    db::run_migrations(&pool).await.expect("failed to migrate");
    pool
}

async fn insert_unused(pool: &DbPool, key: &str) {
    sqlx::query(
        "INSERT INTO licenses (license_key, product_name, validity_days) VALUES ($1, 'Race Test', 30)",
    )
    .bind(key)
    .execute(pool)
    .await
    .expect("failed to insert license");
}

async fn delete_license(pool: &DbPool, key: &str) {
    sqlx::query("DELETE FROM licenses WHERE license_key = $1")
        .bind(key)
        .execute(pool)
        .await
        .expect("failed to delete license");
}

/// Two first activations racing for the same unused license: the status guard
/// in the bind UPDATE must let exactly one of them through, and the loser must
/// be classified from the committed row rather than binding a second time.
#[tokio::test]
#[ignore]
async fn concurrent_first_activations_bind_exactly_once() {
    let pool = test_pool().await;

    // One round rarely interleaves; repeat with fresh keys to give the two
    // tasks real chances to collide inside the bind.
    for round in 0..20 {
        let key = format!("RACE-{round:02}-{:012X}", rand::random::<u64>() & 0xFFFF_FFFF_FFFF);
        insert_unused(&pool, &key).await;

        let pool_a = pool.clone();
        let key_a = key.clone();
        let task_a = tokio::spawn(async move {
            PgLicenseStore::new(&pool_a).try_bind(&key_a, "hw-A").await
        });

        let pool_b = pool.clone();
        let key_b = key.clone();
        let task_b = tokio::spawn(async move {
            PgLicenseStore::new(&pool_b).try_bind(&key_b, "hw-B").await
        });

        let outcome_a = task_a.await.unwrap().unwrap();
        let outcome_b = task_b.await.unwrap().unwrap();

        let bound = [&outcome_a, &outcome_b]
            .iter()
            .filter(|outcome| matches!(outcome, BindOutcome::Bound { .. }))
            .count();
        let conflicts = [&outcome_a, &outcome_b]
            .iter()
            .filter(|outcome| matches!(outcome, BindOutcome::Conflict))
            .count();

        assert_eq!(bound, 1, "round {round}: outcomes {outcome_a:?} / {outcome_b:?}");
        assert_eq!(conflicts, 1, "round {round}: outcomes {outcome_a:?} / {outcome_b:?}");

        // The committed row carries the winner's hardware id
        let winner = if matches!(outcome_a, BindOutcome::Bound { .. }) { "hw-A" } else { "hw-B" };
        let (status, hwid): (String, Option<String>) = sqlx::query_as(
            "SELECT status::text, hwid FROM licenses WHERE license_key = $1",
        )
        .bind(&key)
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(status, "active");
        assert_eq!(hwid.as_deref(), Some(winner));

        delete_license(&pool, &key).await;
    }
}

/// Racing the winner's own device: the loser must come back as an idempotent
/// re-activation with the expiry the winner set, never a second bind.
#[tokio::test]
#[ignore]
async fn concurrent_same_device_activations_agree_on_expiry() {
    let pool = test_pool().await;

    let key = format!("RACE-SAME-{:012X}", rand::random::<u64>() & 0xFFFF_FFFF_FFFF);
    insert_unused(&pool, &key).await;

    let pool_a = pool.clone();
    let key_a = key.clone();
    let task_a =
        tokio::spawn(async move { PgLicenseStore::new(&pool_a).try_bind(&key_a, "hw-A").await });

    let pool_b = pool.clone();
    let key_b = key.clone();
    let task_b =
        tokio::spawn(async move { PgLicenseStore::new(&pool_b).try_bind(&key_b, "hw-A").await });

    let outcome_a = task_a.await.unwrap().unwrap();
    let outcome_b = task_b.await.unwrap().unwrap();

    let expiry = |outcome: &BindOutcome| match outcome {
        BindOutcome::Bound { expires_at } | BindOutcome::AlreadyBound { expires_at } => *expires_at,
        other => panic!("unexpected outcome {other:?}"),
    };

    // Both callers see the same expiry regardless of who won the swap
    assert_eq!(expiry(&outcome_a), expiry(&outcome_b));

    delete_license(&pool, &key).await;
}
