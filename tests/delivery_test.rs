//! Integration tests for the delivery engine

use std::sync::Arc;

use chrono::{Duration, Utc};
use probe_rs::catalog::CatalogManager;
use probe_rs::config::{DeliveryConfig, TierPolicy};
use probe_rs::delivery::{DeliveryEngine, DenyReason};
use probe_rs::ledger::{CooldownScope, LedgerManager};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

fn policy(free_cooldown_hours: i64) -> DeliveryConfig {
    DeliveryConfig {
        subjects: vec!["math".to_string(), "informatics".to_string()],
        free_tier: "free".to_string(),
        cooldown_scope: CooldownScope::SubjectTier,
        admin_ids: vec![],
        tiers: vec![
            TierPolicy {
                name: "free".to_string(),
                cooldown_hours: free_cooldown_hours,
                default_quota: 5,
                price_label: None,
            },
            TierPolicy {
                name: "special".to_string(),
                cooldown_hours: 0,
                default_quota: 0,
                price_label: Some("990 tg".to_string()),
            },
        ],
    }
}

async fn setup(pool: SqlitePool, policy: DeliveryConfig) -> (DeliveryEngine, Arc<LedgerManager>, Arc<CatalogManager>) {
    let ledger = Arc::new(LedgerManager::new(pool.clone(), policy.cooldown_scope));
    ledger.init_db().await.unwrap();

    let catalog = Arc::new(CatalogManager::new(pool));
    catalog.init_db().await.unwrap();

    let engine = DeliveryEngine::new(ledger.clone(), catalog.clone(), policy);
    (engine, ledger, catalog)
}

// Single connection so every query sees the same in-memory database.
async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

/// Default quota 5, catalog items 1..=3: three requests spaced beyond the
/// cooldown deliver the items in order and leave two units of quota; the
/// fourth denies because the partition is exhausted.
#[tokio::test]
async fn test_free_tier_walkthrough() {
    let pool = memory_pool().await;
    let (engine, ledger, catalog) = setup(pool, policy(24)).await;

    for n in 1..=3 {
        catalog
            .ingest("math", "free", &format!("Variant {}", n), &format!("file-{}", n))
            .await
            .unwrap();
    }
    ledger.ensure(1, "math", "free", 5).await.unwrap();

    let start = Utc::now();
    let mut delivered = Vec::new();
    for day in 0..3i64 {
        let outcome = engine
            .deliver_at(1, "math", "free", start + Duration::hours(25 * day))
            .await
            .unwrap();
        delivered.push(outcome.delivered().unwrap().item_id);
    }

    assert_eq!(delivered, vec![1, 2, 3]);

    let record = ledger.read(1, "math", "free").await.unwrap().unwrap();
    assert_eq!(record.remaining_count, 2);
    assert_eq!(record.cursor, 3);

    let outcome = engine
        .deliver_at(1, "math", "free", start + Duration::hours(100))
        .await
        .unwrap();
    assert_eq!(outcome.denied(), Some(&DenyReason::CatalogExhausted));
}

/// The sequence of delivered ids is strictly increasing even when quota is
/// topped up between deliveries.
#[tokio::test]
async fn test_no_double_delivery_across_grants() {
    let pool = memory_pool().await;
    let (engine, ledger, catalog) = setup(pool, policy(0)).await;

    for n in 1..=4 {
        catalog
            .ingest("math", "special", &format!("Premium {}", n), &format!("file-p{}", n))
            .await
            .unwrap();
    }

    let mut delivered = Vec::new();
    for _ in 0..4 {
        ledger.grant(1, "math", "special", 1).await.unwrap();
        let outcome = engine.deliver(1, "math", "special").await.unwrap();
        delivered.push(outcome.delivered().unwrap().item_id);
    }

    let mut sorted = delivered.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(delivered, sorted, "ids must be strictly increasing: {:?}", delivered);
    assert_eq!(delivered.len(), 4);
}

/// A request inside the cooldown window denies and leaves the whole record
/// untouched; the deadline never moves on a denial.
#[tokio::test]
async fn test_cooldown_denial_mutates_nothing() {
    let pool = memory_pool().await;
    let (engine, ledger, catalog) = setup(pool, policy(24)).await;

    catalog.ingest("math", "free", "Variant 1", "file-1").await.unwrap();
    catalog.ingest("math", "free", "Variant 2", "file-2").await.unwrap();
    ledger.ensure(1, "math", "free", 5).await.unwrap();

    let start = Utc::now();
    engine.deliver_at(1, "math", "free", start).await.unwrap();
    let before = ledger.read(1, "math", "free").await.unwrap().unwrap();

    for minutes in [1i64, 30, 600] {
        let outcome = engine
            .deliver_at(1, "math", "free", start + Duration::minutes(minutes))
            .await
            .unwrap();
        assert!(matches!(
            outcome.denied(),
            Some(DenyReason::CooldownActive { .. })
        ));
    }

    let after = ledger.read(1, "math", "free").await.unwrap().unwrap();
    assert_eq!(after, before);
}

/// Quota conservation: N successful deliveries against an initial quota Q
/// leave exactly Q - N, and the count never goes negative.
#[tokio::test]
async fn test_quota_conservation() {
    let pool = memory_pool().await;
    let (engine, ledger, catalog) = setup(pool, policy(0)).await;

    for n in 1..=10 {
        catalog
            .ingest("math", "free", &format!("Variant {}", n), &format!("file-{}", n))
            .await
            .unwrap();
    }
    ledger.ensure(1, "math", "free", 4).await.unwrap();

    let mut successes = 0;
    for _ in 0..10 {
        if engine.deliver(1, "math", "free").await.unwrap().is_delivered() {
            successes += 1;
        }
    }

    assert_eq!(successes, 4);

    let record = ledger.read(1, "math", "free").await.unwrap().unwrap();
    assert_eq!(record.remaining_count, 0);
}

/// Firing concurrent requests at a record with one unit of quota yields
/// exactly one success; the rest deny and the count never reaches -1.
#[tokio::test]
async fn test_concurrent_requests_spend_quota_once() {
    let dir = tempfile::tempdir().unwrap();
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("probe-test.db"))
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    let (engine, ledger, catalog) = setup(pool, policy(0)).await;
    catalog.ingest("math", "free", "Variant 1", "file-1").await.unwrap();
    catalog.ingest("math", "free", "Variant 2", "file-2").await.unwrap();
    ledger.ensure(1, "math", "free", 1).await.unwrap();

    let engine = Arc::new(engine);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.deliver(1, "math", "free").await.unwrap()
        }));
    }

    let mut delivered = 0;
    for handle in handles {
        let outcome = handle.await.unwrap();
        match outcome.denied() {
            None => delivered += 1,
            Some(DenyReason::QuotaExhausted) | Some(DenyReason::Conflict) => {}
            Some(other) => panic!("unexpected denial: {:?}", other),
        }
    }

    assert_eq!(delivered, 1);

    let record = ledger.read(1, "math", "free").await.unwrap().unwrap();
    assert_eq!(record.remaining_count, 0);
    assert_eq!(record.cursor, 1);
}

/// Catalog exhaustion is terminal regardless of remaining quota.
#[tokio::test]
async fn test_catalog_exhaustion_is_terminal() {
    let pool = memory_pool().await;
    let (engine, ledger, catalog) = setup(pool, policy(0)).await;

    catalog.ingest("math", "free", "Variant 1", "file-1").await.unwrap();
    ledger.ensure(1, "math", "free", 100).await.unwrap();

    assert!(engine.deliver(1, "math", "free").await.unwrap().is_delivered());

    for _ in 0..3 {
        let outcome = engine.deliver(1, "math", "free").await.unwrap();
        assert_eq!(outcome.denied(), Some(&DenyReason::CatalogExhausted));
    }

    let record = ledger.read(1, "math", "free").await.unwrap().unwrap();
    assert_eq!(record.remaining_count, 99);
}

/// With a shared cooldown scope a free delivery also closes the window for
/// the paid tiers of the same subject.
#[tokio::test]
async fn test_shared_cooldown_scope_gates_other_tiers() {
    let pool = memory_pool().await;
    let mut shared = policy(24);
    shared.cooldown_scope = CooldownScope::Subject;
    let (engine, ledger, catalog) = setup(pool, shared).await;

    catalog.ingest("math", "free", "Variant 1", "file-1").await.unwrap();
    catalog.ingest("math", "special", "Premium 1", "file-p1").await.unwrap();
    ledger.ensure(1, "math", "free", 5).await.unwrap();
    ledger.grant(1, "math", "special", 5).await.unwrap();

    let start = Utc::now();
    engine.deliver_at(1, "math", "free", start).await.unwrap();

    let outcome = engine
        .deliver_at(1, "math", "special", start + Duration::hours(1))
        .await
        .unwrap();
    assert!(matches!(
        outcome.denied(),
        Some(DenyReason::CooldownActive { .. })
    ));

    // Past the shared window, the paid tier delivers
    let outcome = engine
        .deliver_at(1, "math", "special", start + Duration::hours(25))
        .await
        .unwrap();
    assert!(outcome.is_delivered());
}
