//! End-to-end registration against the in-process connector

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use storehub::config::{EndpointOptions, StoreConfiguration};
use storehub::error::{ConfigurationError, LookupError, PoolError, StoreError};
use storehub::services::{
    ConnectionState, HealthAwareWrapperFactory, MemoryConnector, ProfiledOperation, Profiler,
    StateAwareConnection, StoreHandle,
};
use storehub::utils::RetryConfig;
use storehub::Registrar;

fn store(name: &str, is_default: bool) -> StoreConfiguration {
    let config = StoreConfiguration::new(name, EndpointOptions::default()).with_pool_size(3);
    if is_default {
        config.as_default()
    } else {
        config
    }
}

#[tokio::test]
async fn test_lookup_by_name_and_default() {
    let connector = Arc::new(MemoryConnector::new());
    let context = Registrar::new(connector.clone())
        .register_all(vec![store("cache-a", true), store("cache-b", false)])
        .await
        .unwrap();
    let registry = context.registry();

    assert_eq!(registry.get_client(Some("cache-b")).unwrap().name(), "cache-b");
    assert_eq!(registry.get_client(None).unwrap().name(), "cache-a");
    assert_eq!(
        registry.get_client(Some("missing")).unwrap_err(),
        LookupError::NotFound("missing".to_string())
    );
    assert_eq!(connector.attempts(), 6);
}

#[tokio::test]
async fn test_single_registration_round_trip() {
    let context = Registrar::new(Arc::new(MemoryConnector::new()))
        .register(store("only", false))
        .await
        .unwrap();
    let registry = context.registry();

    let by_default = registry.get_default_client().unwrap();
    let by_name = registry.get_client(Some("only")).unwrap();
    assert!(Arc::ptr_eq(&by_default, &by_name));
    assert!(Arc::ptr_eq(&by_default, context.default_client()));
    assert!(by_default.is_default());
}

#[tokio::test]
async fn test_unnamed_single_store_gets_generated_name() {
    let context = Registrar::new(Arc::new(MemoryConnector::new()))
        .register(store("", false))
        .await
        .unwrap();

    let name = context.default_client().name().to_string();
    assert!(!name.is_empty());
    assert!(context.registry().get_client(Some(&name)).is_ok());
}

#[tokio::test]
async fn test_validation_errors_surface_before_connecting() {
    let connector = Arc::new(MemoryConnector::new());
    let registrar = Registrar::new(connector.clone());

    let cases = [
        (
            vec![store("a", true), store("a", false)],
            ConfigurationError::DuplicateName("a".to_string()),
        ),
        (
            vec![store("a", false), store("b", false)],
            ConfigurationError::NoDefault,
        ),
        (
            vec![store("a", true), store("b", true)],
            ConfigurationError::MultipleDefaults {
                first: "a".to_string(),
                second: "b".to_string(),
            },
        ),
    ];

    for (configs, expected) in cases {
        match registrar.register_all(configs).await {
            Err(StoreError::Configuration(err)) => assert_eq!(err, expected),
            other => panic!("expected {:?}, got {:?}", expected, other.map(|_| ())),
        }
    }
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn test_zero_pool_size_never_connects() {
    let connector = Arc::new(MemoryConnector::new());
    let err = Registrar::new(connector.clone())
        .register(store("cache", true).with_pool_size(0))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Pool(PoolError::PoolSize { size: 0, .. })));
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn test_connect_failure_aborts_startup() {
    let connector = Arc::new(MemoryConnector::fail_after(4));
    let err = Registrar::new(connector.clone())
        .register_all(vec![store("a", true), store("b", false)])
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Pool(PoolError::Connect(_))));
    assert_eq!(connector.attempts(), 5);
    assert!(connector.handles().iter().all(|h| !h.is_connected()));
}

#[tokio::test]
async fn test_round_robin_through_database_view() {
    let context = Registrar::new(Arc::new(MemoryConnector::new()))
        .register(store("cache", true))
        .await
        .unwrap();
    let db = context.default_database();

    let picks: Vec<usize> = (0..4).map(|_| db.connection().unwrap().index()).collect();
    assert_eq!(picks, vec![0, 1, 2, 0]);

    let ids: HashSet<u64> = (0..3).map(|_| db.connection().unwrap().handle().id()).collect();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn test_dropped_connection_recovers() {
    let connector = Arc::new(MemoryConnector::new());
    let retry = RetryConfig::new()
        .with_max_retries(3)
        .with_initial_delay(Duration::from_millis(1))
        .with_jitter(false);
    let config = store("cache", true)
        .with_wrapper_factory(Arc::new(HealthAwareWrapperFactory::new(retry)));

    let context = Registrar::new(connector.clone()).register(config).await.unwrap();
    let manager = context.default_client().manager().clone();

    let first = manager.get_connection().unwrap();
    connector.handles()[first.index()].drop_connection();
    first.report_failure();

    let mut restored = false;
    for _ in 0..200 {
        if manager.connections()[first.index()].state() == ConnectionState::Healthy {
            restored = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(restored);
    assert!(first.handle().is_connected());
    assert_eq!(manager.stats().healthy, 3);

    context.shutdown().await;
}

#[tokio::test]
async fn test_profiling_hook_sees_reconnects() {
    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl Profiler for Counter {
        fn record(&self, operation: &ProfiledOperation) {
            assert_eq!(operation.operation, "reconnect");
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let counter = Arc::new(Counter::default());
    let connector = Arc::new(MemoryConnector::new());
    let config = store("cache", true).with_profiling_hook(counter.clone());

    let context = Registrar::new(connector.clone()).register(config).await.unwrap();
    assert!(connector.handles().iter().all(|h| h.has_profiler()));

    let handle = context.default_database().connection().unwrap().handle().clone();
    handle.reconnect().await.unwrap();
    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
}
