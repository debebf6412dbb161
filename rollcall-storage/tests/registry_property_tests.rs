//! Property tests for the schema registry and the table-backed schema source.
//!
//! **Property: Single Flight**
//! Concurrent lookups of one table within the TTL share one fetch and
//! observe the same schema instance.
//!
//! **Property: Freshness**
//! A lookup after the TTL has elapsed issues a new fetch.

use proptest::prelude::*;
use rollcall_core::{SyncError, TableCatalog, TableConfig};
use rollcall_storage::{CacheConfig, SchemaRegistry, SchemaService, TableSchemaSource};
use rollcall_test_utils::fixtures::{credential, record, school_backend};
use rollcall_test_utils::MockBackend;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn service_with(
    backend: Arc<MockBackend>,
    catalog: TableCatalog,
    ttl: Duration,
) -> SchemaService<TableSchemaSource<MockBackend>> {
    let registry = Arc::new(SchemaRegistry::new(
        CacheConfig::new()
            .with_ttl(ttl)
            .with_cleanup_interval(Duration::from_secs(3600)),
    ));
    SchemaService::new(registry, Arc::new(TableSchemaSource::new(backend, catalog)))
}

type SchoolService = SchemaService<TableSchemaSource<MockBackend>>;

fn school_service(ttl: Duration) -> (Arc<MockBackend>, SchoolService) {
    let backend = Arc::new(school_backend());
    let service = service_with(Arc::clone(&backend), TableCatalog::builtin(), ttl);
    (backend, service)
}

fn test_runtime() -> Result<Runtime, TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

// ============================================================================
// CACHING
// ============================================================================

#[tokio::test]
async fn two_lookups_within_ttl_fetch_once() {
    let (backend, service) = school_service(Duration::from_secs(300));
    let first = service.get_schema("teachers", None).await.unwrap();
    let second = service.get_schema("teachers", None).await.unwrap();

    assert_eq!(backend.read_count("teachers"), 1);
    assert!(Arc::ptr_eq(&first, &second));
    let stats = service.registry().stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.fetches, 1);
}

#[tokio::test(start_paused = true)]
async fn lookup_after_ttl_fetches_again() {
    let (backend, service) = school_service(Duration::from_secs(300));
    service.get_schema("users", None).await.unwrap();

    tokio::time::advance(Duration::from_secs(301)).await;
    service.get_schema("users", None).await.unwrap();
    assert_eq!(backend.read_count("users"), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_lookups_share_one_fetch() {
    let (backend, service) = school_service(Duration::from_secs(300));
    backend.set_latency(Duration::from_millis(50));

    let lookups = (0..8).map(|_| {
        let service = service.clone();
        tokio::spawn(async move { service.get_schema("classes", None).await })
    });
    let results = futures_util::future::join_all(lookups).await;

    let schemas: Vec<_> = results
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();
    assert_eq!(backend.read_count("classes"), 1);
    assert!(schemas.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(service.registry().stats().coalesced, 7);
    assert_eq!(service.registry().stats().in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_concurrent_fetch_reaches_every_waiter_then_retries() {
    let (backend, service) = school_service(Duration::from_secs(300));
    backend.set_latency(Duration::from_millis(20));
    backend.fail_reads("grades", SyncError::Transport("503".into()));

    let a = service.clone();
    let b = service.clone();
    let (ra, rb) = tokio::join!(a.get_schema("grades", None), b.get_schema("grades", None));
    assert!(matches!(ra, Err(SyncError::SchemaFetch { .. })));
    assert_eq!(ra, rb);
    assert_eq!(backend.read_count("grades"), 1);

    backend.clear_read_failures();
    let schema = service.get_schema("grades", None).await.unwrap();
    assert!(schema.has_column("grade_name"));
    assert_eq!(backend.read_count("grades"), 2);
}

#[tokio::test(start_paused = true)]
async fn invalidate_during_fetch_does_not_cache_the_stale_result() {
    let (backend, service) = school_service(Duration::from_secs(300));
    backend.set_latency(Duration::from_millis(50));

    let pending = {
        let service = service.clone();
        tokio::spawn(async move { service.get_schema("courses", None).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    service.registry().invalidate(Some("courses"));

    assert!(pending.await.unwrap().is_ok());
    assert!(service.registry().get("courses").is_none());
}

// ============================================================================
// SCHEMA SOURCE
// ============================================================================

#[tokio::test]
async fn declared_columns_issue_no_read() {
    let backend = Arc::new(school_backend());
    let mut catalog = TableCatalog::builtin();
    catalog.insert(
        "payments",
        TableConfig::new("payment_id", "payments")
            .with_columns(&["payment_id", "amount", "user_id"]),
    );
    let service = service_with(Arc::clone(&backend), catalog, Duration::from_secs(300));

    let schema = service.get_schema("payments", Some(&credential())).await.unwrap();
    assert_eq!(schema.columns, vec!["payment_id", "amount", "user_id"]);
    assert_eq!(backend.total_reads(), 0);
}

#[tokio::test]
async fn empty_table_yields_unknown_schema() {
    let (_backend, service) = school_service(Duration::from_secs(300));
    let schema = service.get_schema("quizzes", None).await.unwrap();
    assert!(!schema.is_known());
    assert_eq!(schema.state_key, "quizzes");
}

#[tokio::test]
async fn unknown_table_is_an_error() {
    let (backend, service) = school_service(Duration::from_secs(300));
    let err = service.get_schema("lockers", None).await.unwrap_err();
    assert!(matches!(err, SyncError::SchemaFetch { ref table, .. } if table == "lockers"));
    assert_eq!(backend.total_reads(), 0);
}

#[tokio::test]
async fn all_schemas_cover_the_catalog() {
    let (_backend, service) = school_service(Duration::from_secs(300));
    let schemas = service.get_all_schemas(None).await.unwrap();
    let names: Vec<&str> = schemas.keys().map(String::as_str).collect();
    let expected: Vec<String> = TableCatalog::builtin().table_names().map(str::to_string).collect();
    assert_eq!(names, expected);
    assert!(schemas["users"].has_column("email"));
}

#[tokio::test]
async fn all_schemas_fail_if_one_table_fails() {
    let (backend, service) = school_service(Duration::from_secs(300));
    backend.fail_reads("students", SyncError::Transport("reset".into()));
    assert!(service.get_all_schemas(None).await.is_err());
}

#[tokio::test]
async fn disposed_registry_rejects_lookups() {
    let (_backend, service) = school_service(Duration::from_secs(300));
    service.registry().dispose().await;
    assert_eq!(service.get_schema("users", None).await, Err(SyncError::Disposed));
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Columns of an inferred schema are exactly the keys of the first row,
    /// in order.
    #[test]
    fn inferred_columns_follow_first_row(
        rows in rollcall_test_utils::strategies::arb_collection("grade_id")
    ) {
        let rt = test_runtime()?;
        let expected: Vec<String> =
            rows.first().map(|r| r.keys().cloned().collect()).unwrap_or_default();
        let backend = Arc::new(MockBackend::default().with_rows("grades", rows));
        let service = service_with(backend, TableCatalog::builtin(), Duration::from_secs(60));

        let schema = rt.block_on(service.get_schema("grades", None))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(&schema.columns, &expected);
        prop_assert_eq!(schema.is_known(), !expected.is_empty());
    }

    /// However many sequential lookups run within the TTL, one read happens.
    #[test]
    fn repeated_lookups_read_once(n in 1usize..20) {
        let rt = test_runtime()?;
        let user = record(json!({"user_id": 1, "user_name": "a"}));
        let backend = Arc::new(MockBackend::default().with_rows("users", vec![user]));
        let service =
            service_with(Arc::clone(&backend), TableCatalog::builtin(), Duration::from_secs(60));

        rt.block_on(async {
            for _ in 0..n {
                service.get_schema("users", None).await?;
            }
            Ok::<_, SyncError>(())
        }).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(backend.read_count("users"), 1);
        let stats = service.registry().stats();
        prop_assert_eq!(stats.hits as usize, n - 1);
    }
}
