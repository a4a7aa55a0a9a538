//! 运行时门面
//!
//! 持有适配器注册表、会话表、查询管道和审计队列，是调用方唯一需要的入口对象。
//! 所有操作都以连接 ID 为键：先解析会话，再把句柄交给对应的适配器。

use log::{error, info, warn};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::adapters::{AdapterRegistry, DatabaseAdapter};
use crate::api::session::{EvictionPolicy, SessionInfo, SessionManager, SessionSlot};
use crate::audit::{AuditLogger, AuditSink, AuditStats, HistoryRecord, MemoryAuditSink, OperationKind};
use crate::config::{AuditConfig, Config};
use crate::core::error::{FailureKind, RuntimeError, RuntimeResult, SessionGone};
use crate::core::types::{
    AdapterDescriptor, AggregationRequest, BackendType, CollectionInfo, ConnectionConfig,
    ConnectionResult, ConnectionStatus, DatabaseInfo, IndexInfo, QueryLanguage, QueryRequest,
    QueryResult, SchemaInfo, SystemInfo, TestResult,
};
use crate::query::{normalize_columns, QueryPipeline, SchemaIntrospector};

pub struct Runtime {
    config: Config,
    registry: Arc<AdapterRegistry>,
    sessions: SessionManager,
    pipeline: QueryPipeline,
    introspector: SchemaIntrospector,
    audit: Arc<AuditLogger>,
}

/// 运行时构建器
///
/// 未指定注册表时按配置注册内置适配器；未指定审计存储时按 `[audit]` 配置选择。
#[derive(Default)]
pub struct RuntimeBuilder {
    config: Config,
    registry: Option<AdapterRegistry>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    eviction: Option<Arc<dyn EvictionPolicy>>,
}

impl RuntimeBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    pub fn eviction_policy(mut self, policy: Arc<dyn EvictionPolicy>) -> Self {
        self.eviction = Some(policy);
        self
    }

    /// 必须在 tokio 运行时内调用（审计写入任务在这里启动）
    pub async fn build(self) -> Runtime {
        let registry = self
            .registry
            .unwrap_or_else(|| AdapterRegistry::from_config(&self.config));

        let audit = if !self.config.audit.enabled {
            info!("Query history is disabled");
            AuditLogger::disabled()
        } else {
            let sink = match self.audit_sink {
                Some(sink) => sink,
                None => default_sink(&self.config.audit).await,
            };
            AuditLogger::spawn(sink, &self.config.audit)
        };
        let audit = Arc::new(audit);

        let mut sessions = SessionManager::new(&self.config.session);
        if let Some(policy) = self.eviction {
            sessions = sessions.with_policy(policy);
        }

        Runtime {
            pipeline: QueryPipeline::new(self.config.query.clone(), Arc::clone(&audit)),
            introspector: SchemaIntrospector::new(),
            registry: Arc::new(registry),
            sessions,
            audit,
            config: self.config,
        }
    }
}

#[cfg(feature = "sqlite-history")]
async fn default_sink(config: &AuditConfig) -> Arc<dyn AuditSink> {
    use crate::audit::SqliteAuditSink;

    match config.sqlite_path.as_deref() {
        Some(path) => match SqliteAuditSink::open(path).await {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                error!(
                    "Failed to open query history at {}: {}. Falling back to memory, keeping only the latest {} records",
                    path, e, config.memory_capacity
                );
                memory_sink(config)
            }
        },
        None => memory_sink(config),
    }
}

#[cfg(not(feature = "sqlite-history"))]
async fn default_sink(config: &AuditConfig) -> Arc<dyn AuditSink> {
    if let Some(path) = config.sqlite_path.as_deref() {
        error!(
            "sqlite-history feature is disabled, ignoring {}. Keeping only the latest {} records in memory",
            path, config.memory_capacity
        );
    }
    memory_sink(config)
}

fn memory_sink(config: &AuditConfig) -> Arc<MemoryAuditSink> {
    Arc::new(MemoryAuditSink::with_capacity(config.memory_capacity))
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// 使用给定注册表和配置
    pub async fn new(registry: AdapterRegistry, config: Config) -> Self {
        Self::builder().registry(registry).config(config).build().await
    }

    pub async fn from_config(config: Config) -> Self {
        Self::builder().config(config).build().await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// 打开连接并登记会话
    pub async fn connect(
        &self,
        backend_type: BackendType,
        config: &ConnectionConfig,
    ) -> RuntimeResult<ConnectionResult> {
        let adapter = self.registry.get(backend_type)?;
        let started = Instant::now();

        let handle = adapter.open(config).await.map_err(|e| {
            warn!("Failed to connect to {}: {}", backend_type, e);
            RuntimeError::from(e)
        })?;

        let slot = match self.sessions.insert(backend_type, handle.clone()) {
            Ok(slot) => slot,
            Err(e) => {
                if let Err(close_err) = adapter.close(handle).await {
                    warn!("Failed to release rejected connection: {}", close_err);
                }
                return Err(e.into());
            }
        };
        let elapsed = started.elapsed().as_millis() as u64;
        self.update_session_gauge();

        self.audit.record(HistoryRecord::operation(
            slot.id(),
            backend_type,
            OperationKind::Connect,
            Some(config.audit_details()),
        ));
        info!(
            "Connected to {} as session {} in {}ms",
            adapter.descriptor().display_name,
            slot.id(),
            elapsed
        );

        Ok(ConnectionResult {
            connection_id: slot.id().to_string(),
            status: ConnectionStatus::Connected,
            message: format!("Connected to {}", adapter.descriptor().display_name),
            execution_time_ms: Some(elapsed),
        })
    }

    /// 关闭会话；句柄释放失败只记录日志
    pub async fn disconnect(&self, connection_id: &str) -> RuntimeResult<()> {
        let slot = self.sessions.remove(connection_id, SessionGone::Closed)?;
        self.update_session_gauge();
        self.release(&slot).await;
        self.audit.record(HistoryRecord::operation(
            slot.id(),
            slot.backend_type(),
            OperationKind::Disconnect,
            None,
        ));
        info!("Disconnected session {}", slot.id());
        Ok(())
    }

    /// 试连后立即关闭，不登记会话，失败写在结果里
    pub async fn test_connection(&self, backend: &str, config: &ConnectionConfig) -> TestResult {
        let started = Instant::now();
        let adapter = match self.registry.get_by_name(backend) {
            Ok(adapter) => adapter,
            Err(e) => return TestResult::failed(e.to_string(), 0),
        };

        match adapter.open(config).await {
            Ok(handle) => {
                if let Err(e) = adapter.close(handle).await {
                    warn!("Failed to close test connection: {}", e);
                }
                TestResult::ok(
                    format!(
                        "Successfully connected to {}",
                        adapter.descriptor().display_name
                    ),
                    started.elapsed().as_millis() as u64,
                )
            }
            Err(e) => {
                let message = match RuntimeError::from(e) {
                    RuntimeError::Connection { kind, message } => kind.describe(&message),
                    other => other.to_string(),
                };
                TestResult::failed(message, started.elapsed().as_millis() as u64)
            }
        }
    }

    pub async fn list_databases(&self, connection_id: &str) -> RuntimeResult<Vec<DatabaseInfo>> {
        let (slot, adapter) = self.session(connection_id)?;
        let databases = self
            .introspector
            .list_databases(adapter.as_ref(), slot.handle())
            .await?;
        slot.touch();
        Ok(databases)
    }

    pub async fn list_collections(
        &self,
        connection_id: &str,
        database: &str,
    ) -> RuntimeResult<Vec<CollectionInfo>> {
        let (slot, adapter) = self.session(connection_id)?;
        let collections = self
            .introspector
            .list_collections(adapter.as_ref(), slot.handle(), database)
            .await?;
        slot.touch();
        Ok(collections)
    }

    pub async fn get_schema(
        &self,
        connection_id: &str,
        database: &str,
        collection: &str,
    ) -> RuntimeResult<SchemaInfo> {
        let (slot, adapter) = self.session(connection_id)?;
        let schema = self
            .introspector
            .get_schema(adapter.as_ref(), slot.handle(), database, collection)
            .await?;
        slot.touch();
        Ok(schema)
    }

    pub async fn get_system_info(&self, connection_id: &str) -> RuntimeResult<SystemInfo> {
        let (slot, adapter) = self.session(connection_id)?;
        let info = adapter.system_info(slot.handle()).await?;
        slot.touch();
        Ok(info)
    }

    /// 执行查询。只有会话不存在时返回 `Err`，其余失败都写在结果里
    ///
    /// 会话的最后使用时间只在成功分发后刷新，连续失败的调用不会让会话保持活跃。
    pub async fn execute_query(
        &self,
        connection_id: &str,
        request: &QueryRequest,
    ) -> RuntimeResult<QueryResult> {
        let slot = self.sessions.resolve(connection_id)?;
        let adapter = match self.registry.get(slot.backend_type()) {
            Ok(adapter) => adapter,
            Err(e) => return Ok(QueryResult::failure(FailureKind::Unknown, &e.to_string(), 0)),
        };
        let result = self.pipeline.run(adapter.as_ref(), &slot, request).await;
        if result.success {
            slot.touch();
        }
        Ok(result)
    }

    pub async fn list_indexes(
        &self,
        connection_id: &str,
        database: &str,
        collection: &str,
    ) -> RuntimeResult<Vec<IndexInfo>> {
        let (slot, adapter) = self.session(connection_id)?;
        if !adapter.descriptor().capabilities.supports_indexes {
            return Err(RuntimeError::UnsupportedOperation {
                backend: slot.backend_type(),
                operation: "list_indexes",
            });
        }
        let indexes = adapter
            .list_indexes(slot.handle(), database, collection)
            .await?;
        slot.touch();
        Ok(indexes)
    }

    /// 执行聚合管道；与 `execute_query` 一样，后端失败写在结果里
    pub async fn execute_aggregation(
        &self,
        connection_id: &str,
        request: &AggregationRequest,
    ) -> RuntimeResult<QueryResult> {
        let (slot, adapter) = self.session(connection_id)?;
        let descriptor = adapter.descriptor();
        if !descriptor.capabilities.supports_aggregation {
            return Err(RuntimeError::UnsupportedOperation {
                backend: slot.backend_type(),
                operation: "execute_aggregation",
            });
        }

        let started = Instant::now();
        let outcome = adapter.execute_aggregation(slot.handle(), request).await;
        let elapsed = started.elapsed().as_millis() as u64;
        let text = serde_json::to_string(&request.pipeline).unwrap_or_default();

        match outcome {
            Ok(page) => {
                let columns = normalize_columns(adapter.as_ref(), &page.columns);
                let result = QueryResult::success(page.rows, columns, page.next_page_state, elapsed);
                self.audit.record(HistoryRecord::query(
                    slot.id(),
                    slot.backend_type(),
                    descriptor.capabilities.query_language,
                    &text,
                    elapsed,
                    Ok(result.row_count),
                ));
                slot.touch();
                Ok(result)
            }
            Err(e) => {
                let kind = e.classify();
                self.audit.record(HistoryRecord::query(
                    slot.id(),
                    slot.backend_type(),
                    descriptor.capabilities.query_language,
                    &text,
                    elapsed,
                    Err(kind.describe(&e.message)),
                ));
                Ok(QueryResult::failure(kind, &e.message, elapsed))
            }
        }
    }

    /// 发现接口
    pub fn describe_backends(&self) -> Vec<AdapterDescriptor> {
        self.registry.describe_all()
    }

    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.sessions.list()
    }

    pub fn session_info(&self, connection_id: &str) -> RuntimeResult<SessionInfo> {
        Ok(self.sessions.info(connection_id)?)
    }

    pub fn query_language(&self, backend_type: BackendType) -> RuntimeResult<QueryLanguage> {
        let adapter = self.registry.get(backend_type)?;
        Ok(adapter.descriptor().capabilities.query_language)
    }

    pub fn audit_stats(&self) -> AuditStats {
        self.audit.stats()
    }

    /// 等待已投递的历史记录写完
    pub async fn flush_audit(&self) {
        self.audit.flush().await;
    }

    /// 回收空闲会话，返回回收数量
    pub async fn reap_expired(&self) -> usize {
        self.reap_expired_at(Instant::now()).await
    }

    pub async fn reap_expired_at(&self, now: Instant) -> usize {
        let expired = self.sessions.collect_expired(now);
        if expired.is_empty() {
            return 0;
        }
        self.update_session_gauge();
        for slot in &expired {
            self.release(slot).await;
            let idle_secs = now
                .saturating_duration_since(slot.last_used_instant())
                .as_secs();
            self.audit.record(HistoryRecord::operation(
                slot.id(),
                slot.backend_type(),
                OperationKind::Expire,
                Some(serde_json::json!({ "idleSecs": idle_secs })),
            ));
        }
        expired.len()
    }

    /// 后台定期回收；运行时被释放后任务自动结束
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let runtime: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(runtime) = runtime.upgrade() else {
                    break;
                };
                runtime.reap_expired().await;
            }
        })
    }

    /// 关闭全部会话并等待审计队列写完
    pub async fn shutdown(&self) {
        let slots = self.sessions.drain();
        if !slots.is_empty() {
            info!("Closing {} open sessions", slots.len());
        }
        self.update_session_gauge();
        for slot in &slots {
            self.release(slot).await;
            self.audit.record(HistoryRecord::operation(
                slot.id(),
                slot.backend_type(),
                OperationKind::Disconnect,
                Some(serde_json::json!({ "reason": "shutdown" })),
            ));
        }
        self.audit.shutdown().await;
    }

    fn session(&self, connection_id: &str) -> RuntimeResult<(Arc<SessionSlot>, Arc<dyn DatabaseAdapter>)> {
        let slot = self.sessions.resolve(connection_id)?;
        let adapter = self.registry.get(slot.backend_type())?;
        Ok((slot, adapter))
    }

    async fn release(&self, slot: &SessionSlot) {
        let adapter = match self.registry.get(slot.backend_type()) {
            Ok(adapter) => adapter,
            Err(e) => {
                error!("Cannot close session {}: {}", slot.id(), e);
                return;
            }
        };
        if let Err(e) = adapter.close(slot.handle().clone()).await {
            warn!("Failed to close connection for session {}: {}", slot.id(), e);
        }
    }

    fn update_session_gauge(&self) {
        metrics::gauge!("polystore_sessions_active").set(self.sessions.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryAdapter;
    use crate::api::session::TtlPolicy;
    use serde_json::json;

    async fn runtime_with(sink: Arc<MemoryAuditSink>) -> (Runtime, Arc<MemoryAdapter>) {
        let adapter = Arc::new(MemoryAdapter::new());
        adapter
            .store()
            .insert_documents("app", "users", vec![json!({"_id": 1, "name": "ada"})]);
        let mut registry = AdapterRegistry::new();
        registry.register(adapter.clone());
        let runtime = Runtime::builder()
            .registry(registry)
            .audit_sink(sink)
            .eviction_policy(Arc::new(TtlPolicy::new(Duration::from_secs(60))))
            .build()
            .await;
        (runtime, adapter)
    }

    #[tokio::test]
    async fn test_connect_and_disconnect_are_audited() {
        let sink = Arc::new(MemoryAuditSink::new());
        let (runtime, _) = runtime_with(sink.clone()).await;

        let result = runtime
            .connect(BackendType::Memory, &ConnectionConfig::default())
            .await
            .expect("connect");
        assert_eq!(result.status, ConnectionStatus::Connected);
        assert_eq!(runtime.list_sessions().len(), 1);

        runtime.disconnect(&result.connection_id).await.expect("disconnect");
        assert!(runtime.list_sessions().is_empty());

        runtime.flush_audit().await;
        let ops: Vec<OperationKind> = sink.operations().iter().map(|o| o.operation).collect();
        assert_eq!(ops, vec![OperationKind::Connect, OperationKind::Disconnect]);
    }

    #[tokio::test]
    async fn test_second_disconnect_reports_closed() {
        let (runtime, _) = runtime_with(Arc::new(MemoryAuditSink::new())).await;
        let id = runtime
            .connect(BackendType::Memory, &ConnectionConfig::default())
            .await
            .expect("connect")
            .connection_id;
        runtime.disconnect(&id).await.expect("disconnect");

        match runtime.disconnect(&id).await {
            Err(RuntimeError::SessionNotFound { reason, .. }) => {
                assert_eq!(reason, SessionGone::Closed)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_only_successful_dispatch_refreshes_last_use() {
        let (runtime, _) = runtime_with(Arc::new(MemoryAuditSink::new())).await;
        let id = runtime
            .connect(BackendType::Memory, &ConnectionConfig::default())
            .await
            .expect("connect")
            .connection_id;
        let created = runtime.session_info(&id).expect("info").created_at;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let failed = runtime
            .execute_query(&id, &QueryRequest::new("SELECT * FROM app.missing_collection"))
            .await
            .expect("failure is data");
        assert!(!failed.success);
        assert!(runtime.get_schema(&id, "nowhere", "nothing").await.is_err());
        assert_eq!(runtime.session_info(&id).expect("info").last_used_at, created);

        let ok = runtime
            .execute_query(&id, &QueryRequest::new("SELECT * FROM app.users"))
            .await
            .expect("query");
        assert!(ok.success);
        assert!(runtime.session_info(&id).expect("info").last_used_at > created);
    }

    #[tokio::test]
    async fn test_unknown_backend_in_test_connection_is_data() {
        let (runtime, _) = runtime_with(Arc::new(MemoryAuditSink::new())).await;
        let result = runtime
            .test_connection("cassandra", &ConnectionConfig::default())
            .await;
        assert!(!result.success);
        assert!(result.message.contains("cassandra"));

        let ok = runtime
            .test_connection("memory", &ConnectionConfig::default())
            .await;
        assert!(ok.success);
        assert!(runtime.list_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_reaper_expires_idle_sessions() {
        let sink = Arc::new(MemoryAuditSink::new());
        let (runtime, _) = runtime_with(sink.clone()).await;
        let id = runtime
            .connect(BackendType::Memory, &ConnectionConfig::default())
            .await
            .expect("connect")
            .connection_id;

        assert_eq!(runtime.reap_expired_at(Instant::now()).await, 0);
        let later = Instant::now() + Duration::from_secs(120);
        assert_eq!(runtime.reap_expired_at(later).await, 1);

        let err = runtime
            .execute_query(&id, &QueryRequest::new("SELECT * FROM users"))
            .await
            .expect_err("expired session");
        assert_eq!(
            err,
            RuntimeError::SessionNotFound {
                id: id.clone(),
                reason: SessionGone::Expired
            }
        );

        runtime.flush_audit().await;
        assert!(sink
            .operations()
            .iter()
            .any(|o| o.operation == OperationKind::Expire && o.connection_id == id));
    }

    #[tokio::test]
    async fn test_shutdown_closes_sessions_and_drains_audit() {
        let sink = Arc::new(MemoryAuditSink::new());
        let (runtime, _) = runtime_with(sink.clone()).await;
        for _ in 0..3 {
            runtime
                .connect(BackendType::Memory, &ConnectionConfig::default())
                .await
                .expect("connect");
        }
        runtime.shutdown().await;

        assert!(runtime.list_sessions().is_empty());
        assert_eq!(sink.operations().len(), 6);
        assert_eq!(runtime.audit_stats().written, 6);
    }

    #[test]
    fn test_memory_sink_is_bounded_by_config() {
        let config = AuditConfig {
            memory_capacity: 7,
            ..Default::default()
        };
        assert_eq!(memory_sink(&config).capacity(), 7);
    }

    #[cfg(feature = "sqlite-history")]
    #[tokio::test]
    async fn test_unopenable_history_falls_back_to_memory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            audit: AuditConfig {
                sqlite_path: Some(dir.path().to_string_lossy().into_owned()),
                memory_capacity: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(MemoryAdapter::new()));
        let runtime = Runtime::new(registry, config).await;
        for _ in 0..3 {
            runtime
                .connect(BackendType::Memory, &ConnectionConfig::default())
                .await
                .expect("connect");
        }
        runtime.flush_audit().await;
        let stats = runtime.audit_stats();
        assert_eq!(stats.written, 3);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_disabled_audit_records_nothing() {
        let config = Config {
            audit: AuditConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(MemoryAdapter::new()));
        let runtime = Runtime::new(registry, config).await;
        runtime
            .connect(BackendType::Memory, &ConnectionConfig::default())
            .await
            .expect("connect");
        assert_eq!(runtime.audit_stats(), AuditStats::default());
    }
}
