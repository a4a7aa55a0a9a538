//! 集成测试共享工具模块
//!
//! 基于内存后端构造独立的运行时：每个测试拥有自己的注册表、存储和审计存储。

#![allow(dead_code)]

pub mod assertions;
pub mod data_fixtures;

use std::sync::Arc;

use polystore::adapters::memory::MemoryAdapter;
use polystore::adapters::AdapterRegistry;
use polystore::audit::MemoryAuditSink;
use polystore::config::Config;
use polystore::core::types::{BackendType, ConnectionConfig};
use polystore::Runtime;

/// 测试运行时包装器
pub struct TestRuntime {
    pub runtime: Runtime,
    pub adapter: Arc<MemoryAdapter>,
    pub audit: Arc<MemoryAuditSink>,
}

impl TestRuntime {
    /// 只注册内存后端，并写入示例数据
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let adapter = Arc::new(MemoryAdapter::new());
        data_fixtures::seed(adapter.store());
        Self::with_adapter(adapter, config).await
    }

    pub async fn with_adapter(adapter: Arc<MemoryAdapter>, config: Config) -> Self {
        let audit = Arc::new(MemoryAuditSink::new());
        let mut registry = AdapterRegistry::new();
        registry.register(adapter.clone());
        let runtime = Runtime::builder()
            .config(config)
            .registry(registry)
            .audit_sink(audit.clone())
            .build()
            .await;
        Self {
            runtime,
            adapter,
            audit,
        }
    }

    /// 连接示例库，返回连接 ID
    pub async fn connect(&self) -> String {
        self.connect_with(ConnectionConfig::default().with_database(data_fixtures::DATABASE))
            .await
    }

    pub async fn connect_with(&self, config: ConnectionConfig) -> String {
        self.runtime
            .connect(BackendType::Memory, &config)
            .await
            .expect("连接内存后端失败")
            .connection_id
    }
}
