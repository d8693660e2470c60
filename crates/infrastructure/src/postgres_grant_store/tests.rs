use chrono::{Duration, Utc};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use privlease_application::{GrantCompletion, GrantStore, NewGrant};
use privlease_core::AppError;
use privlease_domain::{GrantStatus, SchemaPermission};

use super::PostgresGrantStore;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres grant store tests: {error}");
    }

    Some(pool)
}

fn new_grant(principal: &str, resource: &str) -> NewGrant {
    let now = Utc::now();
    NewGrant {
        principal: principal.to_owned(),
        resource: resource.to_owned(),
        permissions: vec![SchemaPermission::Insert, SchemaPermission::Update],
        granted_at: now,
        scheduled_revoke_at: now + Duration::hours(2),
        granted_by: "alice".to_owned(),
        reason: Some("integration test".to_owned()),
        emergency_contact: None,
        scheduled_job_key: format!("{principal}/{resource}"),
    }
}

fn unique_principal(prefix: &str) -> String {
    format!("{prefix}_{}", Utc::now().timestamp_nanos_opt().unwrap_or(0))
}

#[tokio::test]
async fn insert_rejects_second_active_row_per_key() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PostgresGrantStore::new(pool);
    let principal = unique_principal("dup");

    let first = store.insert_grant(new_grant(&principal, "s1")).await;
    assert!(first.is_ok());

    let second = store.insert_grant(new_grant(&principal, "s1")).await;
    assert!(matches!(second, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn completion_is_first_transition_wins() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PostgresGrantStore::new(pool);
    let principal = unique_principal("complete");

    let inserted = store.insert_grant(new_grant(&principal, "s1")).await;
    assert!(inserted.is_ok());

    let completion = GrantCompletion {
        status: GrantStatus::Expired,
        revoked_at: Utc::now(),
        revoked_by: "system".to_owned(),
        reason_override: None,
    };

    let first = store
        .complete_active_grant(&principal, "s1", completion.clone())
        .await;
    let Ok(first) = first else {
        panic!("first completion failed");
    };
    assert_eq!(first.status, GrantStatus::Expired);
    assert!(first.revoked_at.is_some());

    let second = store.complete_active_grant(&principal, "s1", completion).await;
    assert!(matches!(second, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn permissions_roundtrip_through_text_array() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PostgresGrantStore::new(pool);
    let principal = unique_principal("perm");

    let inserted = store.insert_grant(new_grant(&principal, "s1")).await;
    let Ok(inserted) = inserted else {
        panic!("insert failed");
    };

    let found = store.find_active_grant(&principal, "s1").await;
    let Ok(Some(found)) = found else {
        panic!("lookup failed");
    };
    assert_eq!(found.id, inserted.id);
    assert_eq!(
        found.permissions,
        vec![SchemaPermission::Insert, SchemaPermission::Update]
    );
}
