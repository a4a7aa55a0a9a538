//! 内存文档存储适配器
//!
//! 不依赖任何外部服务，适合嵌入式使用、演示和测试。

use async_trait::async_trait;
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod aggregate;
pub mod dialect;
pub mod store;

pub use store::{MemoryCollection, MemoryStore};

use self::dialect::{parse_select, values_equal, Projection, SelectStatement};
use crate::adapters::{expect_handle, BackendHandle, DatabaseAdapter};
use crate::core::error::{AdapterError, AdapterResult, BackendError, FailureKind};
use crate::core::types::{
    AdapterDescriptor, AggregationRequest, BackendType, CanonicalType, Capabilities, ColumnKind,
    ConnectionConfig, IndexInfo, NativeType, PageState, QueryLanguage, QueryRequest, RawColumn,
    RawColumnDef, RawIndexDef, RawPage, RawSchema, Row, SchemaType, SystemInfo,
};
use crate::query::policy::StatementPolicy;

const SYSTEM_DATABASES: &[&str] = &["system"];

/// 内存后端的连接句柄
#[derive(Debug)]
pub struct MemoryHandle {
    store: Arc<MemoryStore>,
    default_database: Option<String>,
    closed: AtomicBool,
}

impl MemoryHandle {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.is_closed() {
            Err(BackendError::classified(
                FailureKind::ConnectionRefused,
                "connection is closed",
            ))
        } else {
            Ok(())
        }
    }
}

/// 内存适配器
pub struct MemoryAdapter {
    descriptor: AdapterDescriptor,
    store: Arc<MemoryStore>,
    credentials: Option<(String, String)>,
    policy: StatementPolicy,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        Self {
            descriptor: AdapterDescriptor {
                backend_type: BackendType::Memory,
                display_name: "In-Memory Document Store".to_string(),
                icon: "🧠".to_string(),
                capabilities: Capabilities {
                    supports_keyspaces: false,
                    supports_indexes: true,
                    supports_aggregation: true,
                    supports_transactions: false,
                    query_language: QueryLanguage::SqlSubset,
                    schema_type: SchemaType::SchemaOptional,
                },
            },
            store,
            credentials: None,
            policy: StatementPolicy::SELECT_ONLY,
        }
    }

    /// 要求连接时提供匹配的用户名和密码
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// 覆盖能力标志，用于模拟能力较少的后端
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.descriptor.capabilities = capabilities;
        self
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    fn resolve_database<'a>(
        handle: &'a MemoryHandle,
        explicit: Option<&'a str>,
    ) -> Result<&'a str, BackendError> {
        explicit
            .or(handle.default_database.as_deref())
            .ok_or_else(|| {
                BackendError::classified(
                    FailureKind::QuerySyntaxError,
                    "no database selected: qualify the collection as database.collection",
                )
            })
    }

    fn run_select(
        &self,
        handle: &MemoryHandle,
        stmt: &SelectStatement,
        request: &QueryRequest,
        page_size: u32,
    ) -> Result<RawPage, BackendError> {
        let database = Self::resolve_database(handle, stmt.database.as_deref())?;
        let offset = match &request.page_state {
            Some(state) => decode_offset(state)?,
            None => 0,
        };

        self.store
            .with_collection(database, &stmt.collection, |coll| {
                let matching: Vec<&Row> = coll
                    .documents
                    .iter()
                    .filter(|doc| match &stmt.filter {
                        Some((field, expected)) => values_equal(
                            doc.get(field).unwrap_or(&serde_json::Value::Null),
                            expected,
                        ),
                        None => true,
                    })
                    .collect();

                let total = stmt
                    .limit
                    .map_or(matching.len(), |limit| limit.min(matching.len()));
                let start = offset.min(total);
                let end = start.saturating_add(page_size as usize).min(total);

                let fields = match &stmt.projection {
                    Projection::All => MemoryCollection::field_names(matching.iter().copied()),
                    Projection::Fields(fields) => fields.clone(),
                };
                let columns = fields
                    .iter()
                    .map(|f| RawColumn {
                        name: f.clone(),
                        native: MemoryCollection::infer_field_type(matching.iter().copied(), f),
                    })
                    .collect();

                let rows = matching[start..end]
                    .iter()
                    .map(|doc| project(doc, &fields))
                    .collect();

                RawPage {
                    columns,
                    rows,
                    next_page_state: (end < total).then(|| encode_offset(end)),
                }
            })
            .ok_or_else(|| {
                BackendError::classified(
                    FailureKind::QuerySyntaxError,
                    format!("unconfigured table {}.{}", database, stmt.collection),
                )
            })
    }
}

/// 按给定字段投影，缺失的字段填 null，保证每一行结构一致
fn project(doc: &Row, fields: &[String]) -> Row {
    fields
        .iter()
        .map(|f| (f.clone(), doc.get(f).cloned().unwrap_or(serde_json::Value::Null)))
        .collect()
}

fn encode_offset(offset: usize) -> PageState {
    PageState::new(hex::encode((offset as u64).to_be_bytes()))
}

fn decode_offset(state: &PageState) -> Result<usize, BackendError> {
    let invalid = || BackendError::new(format!("invalid paging state: {}", state));
    let bytes = hex::decode(state.as_str()).map_err(|_| invalid())?;
    let arr: [u8; 8] = bytes.try_into().map_err(|_| invalid())?;
    usize::try_from(u64::from_be_bytes(arr)).map_err(|_| invalid())
}

fn columns_of(rows: &[Row]) -> Vec<RawColumn> {
    MemoryCollection::field_names(rows)
        .into_iter()
        .map(|name| {
            let native = MemoryCollection::infer_field_type(rows, &name);
            RawColumn { name, native }
        })
        .collect()
}

#[async_trait]
impl DatabaseAdapter for MemoryAdapter {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn open(&self, config: &ConnectionConfig) -> AdapterResult<BackendHandle> {
        if let Some((user, pass)) = &self.credentials {
            match config.credentials() {
                Some((u, p)) if u == user && p == pass => {}
                _ => {
                    return Err(AdapterError::Connection(BackendError::classified(
                        FailureKind::AuthenticationFailed,
                        "Authentication failed: provided username and/or password are incorrect",
                    )))
                }
            }
        }

        let default_database = config
            .database
            .clone()
            .or_else(|| config.keyspace.clone())
            .filter(|db| !db.is_empty());
        if let Some(db) = &default_database {
            if !self.store.has_database(db) {
                return Err(AdapterError::Connection(BackendError::classified(
                    FailureKind::Unknown,
                    format!("database {} does not exist", db),
                )));
            }
        }

        info!("Opened in-memory connection (database: {:?})", default_database);
        Ok(BackendHandle::Memory(Arc::new(MemoryHandle {
            store: Arc::clone(&self.store),
            default_database,
            closed: AtomicBool::new(false),
        })))
    }

    async fn close(&self, handle: BackendHandle) -> AdapterResult<()> {
        let handle = expect_handle!(&handle, Memory, BackendType::Memory)?;
        handle.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn system_databases(&self) -> &[&'static str] {
        SYSTEM_DATABASES
    }

    async fn list_database_names(&self, handle: &BackendHandle) -> AdapterResult<Vec<String>> {
        let handle = expect_handle!(handle, Memory, BackendType::Memory)?;
        handle.ensure_open()?;
        Ok(handle.store.database_names())
    }

    async fn list_collection_names(
        &self,
        handle: &BackendHandle,
        database: &str,
    ) -> AdapterResult<Vec<String>> {
        let handle = expect_handle!(handle, Memory, BackendType::Memory)?;
        handle.ensure_open()?;
        handle
            .store
            .collection_names(database)
            .ok_or_else(|| AdapterError::backend(format!("database {} does not exist", database)))
    }

    async fn collection_cardinality(
        &self,
        handle: &BackendHandle,
        database: &str,
        collection: &str,
    ) -> AdapterResult<u64> {
        let handle = expect_handle!(handle, Memory, BackendType::Memory)?;
        handle.ensure_open()?;
        handle
            .store
            .with_collection(database, collection, |coll| match &coll.metadata_fault {
                Some(fault) => Err(AdapterError::backend(fault.clone())),
                None => Ok(MemoryCollection::field_names(&coll.documents).len() as u64),
            })
            .unwrap_or_else(|| {
                Err(AdapterError::backend(format!(
                    "collection {}.{} does not exist",
                    database, collection
                )))
            })
    }

    async fn describe_collection(
        &self,
        handle: &BackendHandle,
        database: &str,
        collection: &str,
    ) -> AdapterResult<RawSchema> {
        let handle = expect_handle!(handle, Memory, BackendType::Memory)?;
        handle.ensure_open()?;
        handle
            .store
            .with_collection(database, collection, |coll| {
                let columns = MemoryCollection::field_names(&coll.documents)
                    .into_iter()
                    .map(|name| {
                        let native = MemoryCollection::infer_field_type(&coll.documents, &name);
                        let kind = if name == "_id" {
                            ColumnKind::PartitionKey
                        } else {
                            ColumnKind::Regular
                        };
                        RawColumnDef {
                            native_type: native.to_string(),
                            name,
                            kind,
                            position: 0,
                            clustering_order: None,
                        }
                    })
                    .collect();
                let indexes = coll
                    .indexes
                    .iter()
                    .map(|(name, field)| RawIndexDef {
                        name: name.clone(),
                        options: BTreeMap::from([("target".to_string(), field.clone())]),
                    })
                    .collect();
                RawSchema { columns, indexes }
            })
            .ok_or_else(|| {
                AdapterError::backend(format!("collection {}.{} does not exist", database, collection))
            })
    }

    fn statement_policy(&self) -> StatementPolicy {
        self.policy
    }

    async fn execute(
        &self,
        handle: &BackendHandle,
        request: &QueryRequest,
        page_size: u32,
    ) -> Result<RawPage, BackendError> {
        let handle = expect_handle!(handle, Memory, BackendType::Memory)
            .map_err(|e| BackendError::new(e.to_string()))?;
        handle.ensure_open()?;
        let stmt = parse_select(&request.text, &request.parameters)?;
        debug!("Memory query on {:?}.{}", stmt.database, stmt.collection);
        self.run_select(handle, &stmt, request, page_size)
    }

    fn leaf_type(&self, tag: &str) -> Option<CanonicalType> {
        match tag {
            "string" => Some(CanonicalType::Text),
            "long" => Some(CanonicalType::Int64),
            "double" => Some(CanonicalType::Float64),
            "bool" => Some(CanonicalType::Boolean),
            "object" => Some(CanonicalType::Document),
            "null" => Some(CanonicalType::Null),
            _ => None,
        }
    }

    async fn system_info(&self, handle: &BackendHandle) -> AdapterResult<SystemInfo> {
        let handle = expect_handle!(handle, Memory, BackendType::Memory)?;
        handle.ensure_open()?;
        let mut info = SystemInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            cluster_name: Some("in-memory".to_string()),
            nodes_count: Some(1),
            ..Default::default()
        };
        info.extra.insert(
            "databases".to_string(),
            serde_json::Value::from(handle.store.database_names().len() as u64),
        );
        Ok(info)
    }

    async fn list_indexes(
        &self,
        handle: &BackendHandle,
        database: &str,
        collection: &str,
    ) -> AdapterResult<Vec<IndexInfo>> {
        let schema = self.describe_collection(handle, database, collection).await?;
        Ok(schema
            .indexes
            .into_iter()
            .filter_map(|idx| match self.index_target(&idx.options) {
                Some(target) => Some(IndexInfo {
                    name: idx.name,
                    column: target.column,
                    kind: target.kind,
                }),
                None => {
                    debug!("Skipping index {} with unparsable target", idx.name);
                    None
                }
            })
            .collect())
    }

    async fn execute_aggregation(
        &self,
        handle: &BackendHandle,
        request: &AggregationRequest,
    ) -> Result<RawPage, BackendError> {
        let handle = expect_handle!(handle, Memory, BackendType::Memory)
            .map_err(|e| BackendError::new(e.to_string()))?;
        handle.ensure_open()?;
        let database = Self::resolve_database(handle, request.database.as_deref())?;
        let rows = handle
            .store
            .with_collection(database, &request.collection, |coll| {
                aggregate::run_pipeline(&coll.documents, &request.pipeline)
            })
            .ok_or_else(|| {
                BackendError::classified(
                    FailureKind::QuerySyntaxError,
                    format!("unconfigured table {}.{}", database, request.collection),
                )
            })??;

        // 每行补齐所有列，保证列描述与行结构一致
        let columns = columns_of(&rows);
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let rows = rows.iter().map(|r| project(r, &names)).collect();
        Ok(RawPage {
            columns,
            rows,
            next_page_state: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded_adapter() -> MemoryAdapter {
        let adapter = MemoryAdapter::new();
        adapter.store().insert_documents(
            "shop",
            "orders",
            (0..25).map(|i| {
                let status = if i % 2 == 0 { "paid" } else { "open" };
                json!({"_id": i, "total": i * 10, "status": status})
            }),
        );
        adapter
    }

    async fn open(adapter: &MemoryAdapter) -> BackendHandle {
        adapter
            .open(&ConnectionConfig::default().with_database("shop"))
            .await
            .expect("open memory connection")
    }

    #[tokio::test]
    async fn test_pagination_has_no_gaps_or_duplicates() {
        let adapter = seeded_adapter();
        let handle = open(&adapter).await;

        let mut seen = Vec::new();
        let mut request = QueryRequest::new("SELECT * FROM orders");
        loop {
            let page = adapter.execute(&handle, &request, 7).await.expect("page");
            assert!(page.rows.len() <= 7);
            seen.extend(page.rows.iter().map(|r| r["_id"].clone()));
            match page.next_page_state {
                Some(state) => request = request.with_page_state(Some(state)),
                None => break,
            }
        }
        let expected: Vec<serde_json::Value> = (0..25).map(|i| json!(i)).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_limit_bounds_total_rows_across_pages() {
        let adapter = seeded_adapter();
        let handle = open(&adapter).await;

        let request = QueryRequest::new("SELECT _id FROM orders LIMIT 10");
        let first = adapter.execute(&handle, &request, 6).await.expect("first page");
        assert_eq!(first.rows.len(), 6);
        let next = request.with_page_state(first.next_page_state);
        let second = adapter.execute(&handle, &next, 6).await.expect("second page");
        assert_eq!(second.rows.len(), 4);
        assert!(second.next_page_state.is_none());
    }

    #[tokio::test]
    async fn test_invalid_page_state_is_backend_error() {
        let adapter = seeded_adapter();
        let handle = open(&adapter).await;
        let request = QueryRequest::new("SELECT * FROM orders")
            .with_page_state(Some(PageState::new("not-hex")));
        let err = adapter.execute(&handle, &request, 5).await.expect_err("bad cursor");
        assert!(err.message.contains("invalid paging state"));
    }

    #[tokio::test]
    async fn test_credentials_are_enforced() {
        let adapter = MemoryAdapter::new().with_credentials("admin", "secret");
        let err = adapter
            .open(&ConnectionConfig::default())
            .await
            .expect_err("missing credentials");
        match err {
            AdapterError::Connection(be) => {
                assert_eq!(be.classify(), FailureKind::AuthenticationFailed)
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let ok = adapter
            .open(&ConnectionConfig::default().with_credentials("admin", "secret"))
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_closed_handle_rejects_queries() {
        let adapter = seeded_adapter();
        let handle = open(&adapter).await;
        adapter.close(handle.clone()).await.expect("close");
        let err = adapter
            .execute(&handle, &QueryRequest::new("SELECT * FROM orders"), 5)
            .await
            .expect_err("closed");
        assert_eq!(err.classify(), FailureKind::ConnectionRefused);
    }

    #[tokio::test]
    async fn test_aggregation_fills_missing_columns() {
        let adapter = MemoryAdapter::new();
        adapter.store().insert_documents(
            "db",
            "c",
            vec![json!({"a": 1}), json!({"b": "x"})],
        );
        let handle = adapter
            .open(&ConnectionConfig::default())
            .await
            .expect("open");
        let page = adapter
            .execute_aggregation(
                &handle,
                &AggregationRequest {
                    database: Some("db".to_string()),
                    collection: "c".to_string(),
                    pipeline: vec![],
                },
            )
            .await
            .expect("aggregate");
        assert_eq!(page.columns.len(), 2);
        assert!(page.rows.iter().all(|r| r.len() == 2));
    }

    #[test]
    fn test_keyspace_is_accepted_as_default_database() {
        let adapter = seeded_adapter();
        let handle = tokio_test::block_on(
            adapter.open(&ConnectionConfig::default().with_keyspace("shop")),
        )
        .expect("open with keyspace");
        let page = tokio_test::block_on(adapter.execute(
            &handle,
            &QueryRequest::new("SELECT _id FROM orders LIMIT 1"),
            10,
        ))
        .expect("query default database");
        assert_eq!(page.rows.len(), 1);

        let missing = tokio_test::block_on(
            adapter.open(&ConnectionConfig::default().with_keyspace("nope")),
        );
        assert!(matches!(missing, Err(AdapterError::Connection(_))));
    }
}
