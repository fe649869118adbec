//! `PgEntitlementStore` against a real database.
//!
//! Set `TEST_DATABASE_URL` (or `DATABASE_URL`) to a scratch Postgres database.
//! Without one these tests return early. Each test works on its own random
//! user id so they can share the database and run in parallel.

use sqlx::PgPool;
use uuid::Uuid;

use vodgate::db::{self, EntitlementStore, PgEntitlementStore};
use vodgate::models::{AuditAction, NewAuditEntry};
use vodgate::services::entitlement::EntitlementService;

async fn setup_test_db() -> Option<PgPool> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL"))
    else {
        eprintln!("TEST_DATABASE_URL not set, skipping Postgres store tests");
        return None;
    };

    let pool = db::create_pool(&url)
        .await
        .expect("Failed to create test database pool");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    Some(pool)
}

fn fresh_user() -> i64 {
    (Uuid::new_v4().as_u128() >> 80) as i64 + 1
}

#[tokio::test]
async fn test_duplicate_rows_are_all_deleted() {
    let Some(pool) = setup_test_db().await else {
        return;
    };
    let store = PgEntitlementStore::new(pool);
    let user = fresh_user();

    store.insert(user, 7).await.unwrap();
    store.insert(user, 7).await.unwrap();

    let (records, total) = store.list_for_user(user, 10, 0).await.unwrap();
    assert_eq!(total, 2);
    assert_eq!(records.len(), 2);

    assert_eq!(store.delete(user, 7).await.unwrap(), 2);
    assert!(!store.exists_any(user, &[7]).await.unwrap());
    assert_eq!(store.delete(user, 7).await.unwrap(), 0);
}

#[tokio::test]
async fn test_exists_any_over_candidates() {
    let Some(pool) = setup_test_db().await else {
        return;
    };
    let store = PgEntitlementStore::new(pool);
    let user = fresh_user();

    store.insert(user, 10).await.unwrap();

    assert!(store.exists_any(user, &[11, 10]).await.unwrap());
    assert!(store.exists_any(user, &[10]).await.unwrap());
    assert!(!store.exists_any(user, &[11, 12]).await.unwrap());
    assert!(!store.exists_any(user, &[]).await.unwrap());
    assert!(!store.exists_any(user + 1, &[10]).await.unwrap());
}

#[tokio::test]
async fn test_list_is_newest_first_with_total() {
    let Some(pool) = setup_test_db().await else {
        return;
    };
    let store = PgEntitlementStore::new(pool);
    let user = fresh_user();

    for product_id in [1, 2, 3] {
        store.insert(user, product_id).await.unwrap();
    }

    let (first, total) = store.list_for_user(user, 2, 0).await.unwrap();
    assert_eq!(total, 3);
    let ids: Vec<i64> = first.iter().map(|e| e.product_id).collect();
    assert_eq!(ids, vec![3, 2]);
    assert!(first.iter().all(|e| e.user_id == user));

    let (rest, total) = store.list_for_user(user, 2, 2).await.unwrap();
    assert_eq!(total, 3);
    let ids: Vec<i64> = rest.iter().map(|e| e.product_id).collect();
    assert_eq!(ids, vec![1]);

    let pairs = store.all_pairs().await.unwrap();
    for product_id in [1, 2, 3] {
        assert_eq!(
            pairs.iter().filter(|&&p| p == (user, product_id)).count(),
            1
        );
    }
}

#[tokio::test]
async fn test_audit_round_trip() {
    let Some(pool) = setup_test_db().await else {
        return;
    };
    let store = PgEntitlementStore::new(pool);
    let user = fresh_user();

    store
        .append_audit(NewAuditEntry {
            user_id: user,
            product_id: 7,
            action: AuditAction::Grant,
            reason: Some("[order #123] payment".into()),
            actor_id: user,
        })
        .await
        .unwrap();
    store
        .append_audit(NewAuditEntry {
            user_id: user,
            product_id: 7,
            action: AuditAction::Revoke,
            reason: None,
            actor_id: 1,
        })
        .await
        .unwrap();

    let trail = store.audit_for(user, 7).await.unwrap();
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0].action, AuditAction::Grant);
    assert_eq!(trail[0].reason.as_deref(), Some("[order #123] payment"));
    assert_eq!(trail[0].actor_id, user);
    assert_eq!(trail[1].action, AuditAction::Revoke);
    assert_eq!(trail[1].reason, None);
    assert_eq!(trail[1].actor_id, 1);
    assert!(trail[0].id < trail[1].id);

    assert!(store.audit_for(user, 8).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_service_over_postgres() {
    let Some(pool) = setup_test_db().await else {
        return;
    };
    let service = EntitlementService::new(std::sync::Arc::new(PgEntitlementStore::new(pool)));
    let user = fresh_user();

    service.ping().await.unwrap();
    assert!(service.grant(user, 10, "admin grant", 1).await);
    assert!(service.grant(user, 10, "admin grant", 1).await);
    assert!(service.has_access_any(user, &[11, 10]).await);

    assert!(service.revoke(user, 10, "admin revoke", 1).await);
    assert!(!service.has_access(user, 10).await);

    let trail = service.audit_trail(user, 10).await.unwrap();
    let actions: Vec<AuditAction> = trail.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::Grant, AuditAction::Grant, AuditAction::Revoke]
    );
}
