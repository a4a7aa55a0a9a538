//! Cassandra 适配器集成测试
//!
//! 不依赖真实集群：只验证不可达地址的错误分类，以及 test_connection 的容错。

#![cfg(feature = "cassandra")]

use std::time::Duration;

use polystore::config::{CassandraConfig, Config};
use polystore::core::error::{FailureKind, RuntimeError};
use polystore::core::types::{BackendType, ConnectionConfig};
use polystore::Runtime;

async fn runtime() -> Runtime {
    let config = Config {
        cassandra: CassandraConfig {
            connect_timeout_secs: 3,
            ..Default::default()
        },
        audit: polystore::config::AuditConfig {
            sqlite_path: None,
            ..Default::default()
        },
        ..Default::default()
    };
    Runtime::from_config(config).await
}

#[tokio::test]
async fn test_unreachable_port_is_refused_or_timeout() {
    let runtime = runtime().await;
    let outcome = tokio::time::timeout(
        Duration::from_secs(30),
        runtime.connect(BackendType::Cassandra, &ConnectionConfig::host_port("localhost", 1)),
    )
    .await
    .expect("连接应在驱动超时内结束");

    match outcome {
        Err(RuntimeError::Connection { kind, message }) => {
            assert!(
                matches!(kind, FailureKind::ConnectionRefused | FailureKind::Timeout),
                "unexpected classification {:?}: {}",
                kind,
                message
            );
        }
        other => panic!("expected connection failure, got {:?}", other),
    }
    assert!(runtime.list_sessions().is_empty());
}

#[tokio::test]
async fn test_test_connection_reports_failure_as_data() {
    let runtime = runtime().await;
    let result = runtime
        .test_connection("scylladb", &ConnectionConfig::host_port("127.0.0.1", 1))
        .await;
    assert!(!result.success);
    assert!(
        result.message.starts_with("ConnectionRefused: ") || result.message.starts_with("Timeout: "),
        "{}",
        result.message
    );
}

#[tokio::test]
async fn test_missing_host_is_rejected_before_dialing() {
    let runtime = runtime().await;
    let config = ConnectionConfig {
        uri: Some("cassandra:///keyspace".to_string()),
        ..Default::default()
    };
    let err = runtime
        .connect(BackendType::Cassandra, &config)
        .await
        .expect_err("连接串没有主机");
    assert!(matches!(err, RuntimeError::InvalidConfig(_)));

    let err = runtime
        .connect(BackendType::Cassandra, &ConnectionConfig::default())
        .await
        .expect_err("缺少主机");
    assert!(matches!(err, RuntimeError::InvalidConfig(_)));
}
