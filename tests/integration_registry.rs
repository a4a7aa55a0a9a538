//! 适配器注册表集成测试
//!
//! 测试范围:
//! - 同一类型重复获取返回同一实例
//! - 未注册类型报 AdapterNotFound
//! - 发现接口与查询语言

mod common;

use std::sync::Arc;

use polystore::adapters::memory::MemoryAdapter;
use polystore::adapters::{AdapterRegistry, DatabaseAdapter};
use polystore::config::Config;
use polystore::core::error::{ErrorCode, RuntimeError};
use polystore::core::types::{BackendType, ConnectionConfig, QueryLanguage};

use common::TestRuntime;

#[test]
fn test_registered_types_resolve_to_same_instance() {
    let registry = AdapterRegistry::with_defaults();
    for backend_type in registry.available_types() {
        let a = registry.get(backend_type).expect("已注册的后端");
        let b = registry.get(backend_type).expect("已注册的后端");
        assert!(Arc::ptr_eq(&a, &b), "{} 应返回同一实例", backend_type);
    }
}

#[test]
fn test_unregistered_types_always_fail() {
    let registry = AdapterRegistry::with_defaults();
    for backend_type in BackendType::ALL {
        if registry.has(backend_type) {
            continue;
        }
        let err = registry.get(backend_type).err().expect("未注册的后端");
        assert_eq!(err.error_code(), ErrorCode::ResourceNotFound);
        assert!(matches!(err, RuntimeError::AdapterNotFound { .. }));
    }
}

#[test]
fn test_independent_registries_do_not_share_state() {
    let mut first = AdapterRegistry::new();
    let second = AdapterRegistry::new();
    first.register(Arc::new(MemoryAdapter::new()));

    assert!(first.has(BackendType::Memory));
    assert!(!second.has(BackendType::Memory));
    assert!(second.is_empty());
}

#[test]
fn test_available_types_are_sorted() {
    let registry = AdapterRegistry::from_config(&Config::default());
    let types = registry.available_types();
    let mut sorted = types.clone();
    sorted.sort();
    assert_eq!(types, sorted);
    assert!(types.contains(&BackendType::Memory));
}

#[cfg(feature = "cassandra")]
#[test]
fn test_cassandra_family_shares_contract() {
    let registry = AdapterRegistry::with_defaults();
    let cassandra = registry.get(BackendType::Cassandra).expect("cassandra");
    let scylla = registry.get(BackendType::ScyllaDb).expect("scylladb");

    assert_eq!(cassandra.descriptor().capabilities, scylla.descriptor().capabilities);
    assert_eq!(cassandra.descriptor().capabilities.query_language, QueryLanguage::Cql);
    assert!(cassandra.statement_policy().is_read_only());
    assert_ne!(cassandra.descriptor().display_name, scylla.descriptor().display_name);
}

#[tokio::test]
async fn test_connect_to_unregistered_backend() {
    let t = TestRuntime::new().await;
    let err = t
        .runtime
        .connect(BackendType::MongoDb, &ConnectionConfig::default())
        .await
        .expect_err("mongodb 未注册");
    match err {
        RuntimeError::AdapterNotFound { requested, available } => {
            assert_eq!(requested, "mongodb");
            assert_eq!(available, vec!["memory".to_string()]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(t.runtime.list_sessions().is_empty());
}

#[tokio::test]
async fn test_discovery_and_query_language() {
    let t = TestRuntime::new().await;
    let backends = t.runtime.describe_backends();
    assert_eq!(backends.len(), 1);
    assert_eq!(backends[0].backend_type, BackendType::Memory);
    assert!(backends[0].capabilities.supports_aggregation);

    assert_eq!(
        t.runtime.query_language(BackendType::Memory).expect("memory"),
        QueryLanguage::SqlSubset
    );
    assert!(t.runtime.query_language(BackendType::Redis).is_err());
}
