//! 会话管理集成测试
//!
//! 测试范围:
//! - connect/disconnect 生命周期
//! - 会话不存在时的原因（unknown / closed / expired）
//! - 最大会话数限制
//! - 空闲回收与后台回收任务
//! - 多线程并发连接与并发使用不同会话

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use polystore::config::{Config, SessionConfig};
use polystore::core::error::{RuntimeError, SessionGone};
use polystore::core::types::{BackendType, ConnectionConfig, ConnectionStatus, QueryRequest};

use futures::future::join_all;

use common::assertions::assert_err_with;
use common::data_fixtures::{DATABASE, ORDERS};
use common::TestRuntime;

fn session_gone(err: RuntimeError) -> SessionGone {
    match err {
        RuntimeError::SessionNotFound { reason, .. } => reason,
        other => panic!("expected SessionNotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_connect_returns_connected_status() {
    let t = TestRuntime::new().await;
    let result = t
        .runtime
        .connect(
            BackendType::Memory,
            &ConnectionConfig::host_port("localhost", 9042).with_database("shop"),
        )
        .await
        .expect("连接失败");

    assert_eq!(result.status, ConnectionStatus::Connected);
    assert!(!result.connection_id.is_empty());
    assert!(uuid::Uuid::parse_str(&result.connection_id).is_ok());
    assert!(result.execution_time_ms.is_some());

    let json = serde_json::to_value(&result).expect("序列化");
    assert_eq!(json["status"], "connected");
    assert!(json.get("connectionId").is_some());
}

#[tokio::test]
async fn test_every_operation_fails_after_disconnect() {
    let t = TestRuntime::new().await;
    let id = t.connect().await;
    t.runtime.disconnect(&id).await.expect("断开失败");

    assert_eq!(
        session_gone(t.runtime.list_databases(&id).await.unwrap_err()),
        SessionGone::Closed
    );
    assert_eq!(
        session_gone(t.runtime.list_collections(&id, "shop").await.unwrap_err()),
        SessionGone::Closed
    );
    assert_eq!(
        session_gone(t.runtime.get_schema(&id, "shop", "orders").await.unwrap_err()),
        SessionGone::Closed
    );
    assert_eq!(
        session_gone(
            t.runtime
                .execute_query(&id, &QueryRequest::new("SELECT * FROM orders"))
                .await
                .unwrap_err()
        ),
        SessionGone::Closed
    );
    assert_eq!(
        session_gone(t.runtime.get_system_info(&id).await.unwrap_err()),
        SessionGone::Closed
    );
    assert_eq!(
        session_gone(t.runtime.disconnect(&id).await.unwrap_err()),
        SessionGone::Closed
    );
    assert!(t.runtime.session_info(&id).is_err());
}

#[tokio::test]
async fn test_unknown_id_is_reported_as_unknown() {
    let t = TestRuntime::new().await;
    let err = t
        .runtime
        .execute_query("no-such-session", &QueryRequest::new("SELECT * FROM orders"))
        .await
        .unwrap_err();
    assert_eq!(session_gone(err), SessionGone::Unknown);
}

#[tokio::test]
async fn test_session_limit_is_enforced() {
    let config = Config {
        session: SessionConfig {
            max_sessions: 2,
            ..Default::default()
        },
        ..Default::default()
    };
    let t = TestRuntime::with_config(config).await;
    let first = t.connect().await;
    let _second = t.connect().await;

    let third = t
        .runtime
        .connect(BackendType::Memory, &ConnectionConfig::default())
        .await;
    assert!(matches!(third, Err(RuntimeError::SessionLimitExceeded(2))));

    t.runtime.disconnect(&first).await.expect("断开失败");
    t.connect().await;
    assert_eq!(t.runtime.list_sessions().len(), 2);
}

#[tokio::test]
async fn test_failed_open_registers_no_session() {
    let t = TestRuntime::new().await;
    let result = t
        .runtime
        .connect(
            BackendType::Memory,
            &ConnectionConfig::default().with_database("missing"),
        )
        .await;
    assert!(matches!(result, Err(RuntimeError::Connection { .. })));
    assert!(t.runtime.list_sessions().is_empty());
}

#[tokio::test]
async fn test_test_connection_never_registers() {
    let t = TestRuntime::new().await;
    let ok = t
        .runtime
        .test_connection("memory", &ConnectionConfig::default())
        .await;
    assert!(ok.success);

    let failed = t
        .runtime
        .test_connection("memory", &ConnectionConfig::default().with_database("missing"))
        .await;
    assert!(!failed.success);
    assert!(!failed.message.is_empty());

    let unknown = t
        .runtime
        .test_connection("oracle", &ConnectionConfig::default())
        .await;
    assert!(!unknown.success);
    assert!(unknown.message.contains("oracle"));

    assert!(t.runtime.list_sessions().is_empty());
}

#[tokio::test]
async fn test_session_info_tracks_last_use() {
    let t = TestRuntime::new().await;
    let id = t.connect().await;
    let before = t.runtime.session_info(&id).expect("会话信息");
    assert_eq!(before.backend_type, BackendType::Memory);

    tokio::time::sleep(Duration::from_millis(20)).await;
    t.runtime
        .execute_query(&id, &QueryRequest::new("SELECT * FROM orders LIMIT 1"))
        .await
        .expect("查询");
    let after = t.runtime.session_info(&id).expect("会话信息");
    assert!(after.last_used_at > before.last_used_at);
    assert_eq!(after.created_at, before.created_at);

    let json = serde_json::to_value(&after).expect("序列化");
    assert!(json.get("lastUsedAt").is_some());
    assert!(json.get("handle").is_none());
}

#[tokio::test]
async fn test_idle_sessions_are_reclaimed() {
    let config = Config {
        session: SessionConfig {
            idle_timeout_secs: 60,
            ..Default::default()
        },
        ..Default::default()
    };
    let t = TestRuntime::with_config(config).await;
    let idle = t.connect().await;
    let busy = t.connect().await;

    assert_eq!(t.runtime.reap_expired_at(Instant::now()).await, 0);
    let later = Instant::now() + Duration::from_secs(61);
    assert_eq!(t.runtime.reap_expired_at(later).await, 2);

    for id in [&idle, &busy] {
        let err = t.runtime.disconnect(id).await.unwrap_err();
        assert_eq!(session_gone(err), SessionGone::Expired);
    }
    assert_err_with(t.runtime.session_info(&idle), "expired");
}

#[tokio::test]
async fn test_reaper_task_stops_with_runtime() {
    let t = TestRuntime::new().await;
    let runtime = Arc::new(t.runtime);
    let reaper = runtime.spawn_reaper(Duration::from_millis(10));

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!reaper.is_finished());

    drop(runtime);
    tokio::time::timeout(Duration::from_secs(1), reaper)
        .await
        .expect("回收任务应在运行时释放后退出")
        .expect("回收任务异常退出");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connects_never_overshoot_limit() {
    const LIMIT: usize = 5;
    const ATTEMPTS: usize = 32;
    let config = Config {
        session: SessionConfig {
            max_sessions: LIMIT,
            ..Default::default()
        },
        ..Default::default()
    };
    let t = TestRuntime::with_config(config).await;
    let runtime = Arc::new(t.runtime);

    let attempts = (0..ATTEMPTS).map(|_| {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move {
            runtime
                .connect(
                    BackendType::Memory,
                    &ConnectionConfig::default().with_database(DATABASE),
                )
                .await
        })
    });

    let mut connected = 0;
    let mut rejected = 0;
    for joined in join_all(attempts).await {
        match joined.expect("连接任务异常退出") {
            Ok(_) => connected += 1,
            Err(RuntimeError::SessionLimitExceeded(limit)) => {
                assert_eq!(limit, LIMIT);
                rejected += 1;
            }
            Err(other) => panic!("unexpected connect error: {:?}", other),
        }
    }
    assert_eq!(connected, LIMIT);
    assert_eq!(rejected, ATTEMPTS - LIMIT);
    assert_eq!(runtime.list_sessions().len(), LIMIT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_are_used_concurrently() {
    let t = TestRuntime::new().await;
    let mut ids = Vec::new();
    for _ in 0..8 {
        ids.push(t.connect().await);
    }
    let runtime = Arc::new(t.runtime);

    // 一半会话持续查询，另一半同时断开，互不影响
    let tasks = ids.iter().cloned().enumerate().map(|(i, id)| {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move {
            if i % 2 == 1 {
                runtime.disconnect(&id).await.expect("断开失败");
                return 0;
            }
            let mut rows = 0;
            for _ in 0..20 {
                let result = runtime
                    .execute_query(&id, &QueryRequest::new("SELECT * FROM orders"))
                    .await
                    .expect("会话有效");
                assert!(result.success, "{:?}", result.error);
                rows += result.row_count;
            }
            rows
        })
    });

    let totals: Vec<usize> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("会话任务异常退出"))
        .collect();
    for (i, rows) in totals.iter().enumerate() {
        let expected = if i % 2 == 1 { 0 } else { 20 * ORDERS };
        assert_eq!(*rows, expected, "session #{}", i);
    }
    assert_eq!(runtime.list_sessions().len(), 4);
}
