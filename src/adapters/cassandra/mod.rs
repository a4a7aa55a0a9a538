//! Apache Cassandra / ScyllaDB 适配器
//!
//! 两者共享 CQL 协议，用同一个实现，分别以两个后端类型注册。

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};
use scylla::frame::response::result::{ColumnType, CqlValue, Row as CqlRow};
use scylla::load_balancing::DefaultPolicy;
use scylla::query::Query;
use scylla::serialize::row::SerializeRow;
use scylla::{ExecutionProfile, Session, SessionBuilder};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub mod errors;
pub mod types;
pub mod values;

use self::types::{cql_leaf_type, native_from_column_type};
use self::values::{bind_parameters, cql_to_json, text_at};
use crate::adapters::{expect_handle, BackendHandle, DatabaseAdapter};
use crate::config::CassandraConfig;
use crate::core::error::{AdapterError, AdapterResult, BackendError, FailureKind};
use crate::core::types::{
    AdapterDescriptor, BackendType, CanonicalType, Capabilities, ColumnKind, ConnectionConfig,
    IndexInfo, PageState, QueryLanguage, QueryRequest, RawColumn, RawColumnDef, RawIndexDef,
    RawPage, RawSchema, Row, SchemaType, SystemInfo,
};
use crate::query::policy::StatementPolicy;

const DEFAULT_PORT: u16 = 9042;

const SYSTEM_KEYSPACES: &[&str] = &[
    "system",
    "system_auth",
    "system_distributed",
    "system_distributed_everywhere",
    "system_schema",
    "system_traces",
    "system_views",
    "system_virtual_schema",
];

/// CQL 连接句柄
pub struct CassandraHandle {
    session: Session,
    backend_type: BackendType,
    keyspace: Option<String>,
}

impl CassandraHandle {
    pub fn backend_type(&self) -> BackendType {
        self.backend_type
    }

    pub fn keyspace(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }
}

impl fmt::Debug for CassandraHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CassandraHandle")
            .field("backend_type", &self.backend_type)
            .field("keyspace", &self.keyspace)
            .finish_non_exhaustive()
    }
}

/// CQL 适配器
pub struct CassandraAdapter {
    descriptor: AdapterDescriptor,
    settings: CassandraConfig,
}

impl CassandraAdapter {
    fn capabilities() -> Capabilities {
        Capabilities {
            supports_keyspaces: true,
            supports_indexes: true,
            supports_aggregation: false,
            supports_transactions: false,
            query_language: QueryLanguage::Cql,
            schema_type: SchemaType::SchemaRequired,
        }
    }

    pub fn cassandra() -> Self {
        Self {
            descriptor: AdapterDescriptor {
                backend_type: BackendType::Cassandra,
                display_name: "Apache Cassandra".to_string(),
                icon: "🗂️".to_string(),
                capabilities: Self::capabilities(),
            },
            settings: CassandraConfig::default(),
        }
    }

    pub fn scylla() -> Self {
        Self {
            descriptor: AdapterDescriptor {
                backend_type: BackendType::ScyllaDb,
                display_name: "ScyllaDB".to_string(),
                icon: "🐙".to_string(),
                capabilities: Self::capabilities(),
            },
            settings: CassandraConfig::default(),
        }
    }

    /// 使用配置文件中的超时和默认数据中心
    pub fn with_settings(mut self, settings: CassandraConfig) -> Self {
        self.settings = settings;
        self
    }

    /// 无元数据语句，不分页
    async fn fetch_rows<V>(session: &Session, cql: &str, values: V) -> AdapterResult<Vec<CqlRow>>
    where
        V: SerializeRow + Send + Sync,
    {
        let result = session
            .query(cql, values)
            .await
            .map_err(|e| AdapterError::Backend(errors::from_query_error(&e)))?;
        Ok(result.rows.unwrap_or_default())
    }
}

/// 解析联系点：`uri` 优先（`cassandra://h1:9042,h2/keyspace`），否则取 `host`/`port`
pub fn contact_points(config: &ConnectionConfig) -> AdapterResult<(Vec<String>, Option<String>)> {
    let with_port = |host: &str| {
        if host.contains(':') {
            host.to_string()
        } else {
            format!("{}:{}", host, config.port.unwrap_or(DEFAULT_PORT))
        }
    };

    if let Some(uri) = config.uri.as_deref().filter(|u| !u.trim().is_empty()) {
        let rest = uri
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(uri);
        let (hosts, keyspace) = match rest.split_once('/') {
            Some((hosts, ks)) => (hosts, Some(ks.trim_end_matches('/').to_string())),
            None => (rest, None),
        };
        let points: Vec<String> = hosts
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(with_port)
            .collect();
        if points.is_empty() {
            return Err(AdapterError::InvalidConfig(format!("uri has no hosts: {}", uri)));
        }
        let keyspace = keyspace.filter(|k| !k.is_empty()).or_else(|| config.keyspace.clone());
        return Ok((points, keyspace));
    }

    let host = config
        .host
        .as_deref()
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| AdapterError::InvalidConfig("host is required".to_string()))?;
    let points = host
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(with_port)
        .collect();
    Ok((points, config.keyspace.clone().filter(|k| !k.is_empty())))
}

fn encode_page_state(bytes: &Bytes) -> PageState {
    PageState::new(hex::encode(bytes))
}

fn decode_page_state(state: &PageState) -> Result<Bytes, BackendError> {
    hex::decode(state.as_str())
        .map(Bytes::from)
        .map_err(|_| BackendError::new(format!("invalid paging state: {}", state)))
}

#[async_trait]
impl DatabaseAdapter for CassandraAdapter {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn open(&self, config: &ConnectionConfig) -> AdapterResult<BackendHandle> {
        let (points, keyspace) = contact_points(config)?;
        let data_center = config
            .local_data_center
            .clone()
            .unwrap_or_else(|| self.settings.default_local_data_center.clone());
        let connect_timeout = Duration::from_secs(self.settings.connect_timeout_secs);

        let policy = DefaultPolicy::builder()
            .prefer_datacenter(data_center.clone())
            .token_aware(true)
            .build();
        let profile = ExecutionProfile::builder()
            .load_balancing_policy(policy)
            .request_timeout(Some(Duration::from_secs(self.settings.request_timeout_secs)))
            .build();

        let mut builder = SessionBuilder::new()
            .known_nodes(&points)
            .connection_timeout(connect_timeout)
            .default_execution_profile_handle(profile.into_handle());
        if let Some((user, pass)) = config.credentials() {
            builder = builder.user(user, pass);
        }
        if let Some(ks) = &keyspace {
            builder = builder.use_keyspace(ks, false);
        }

        debug!(
            "Connecting to {} at {:?} (dc: {})",
            self.backend_type(),
            points,
            data_center
        );
        let session = tokio::time::timeout(connect_timeout, builder.build())
            .await
            .map_err(|_| {
                AdapterError::Connection(BackendError::classified(
                    FailureKind::Timeout,
                    format!("connection timed out after {}s", connect_timeout.as_secs()),
                ))
            })?
            .map_err(|e| AdapterError::Connection(errors::from_new_session_error(&e)))?;

        info!("Connected to {} at {:?}", self.backend_type(), points);
        Ok(BackendHandle::Cassandra(Arc::new(CassandraHandle {
            session,
            backend_type: self.backend_type(),
            keyspace,
        })))
    }

    async fn close(&self, handle: BackendHandle) -> AdapterResult<()> {
        let inner = expect_handle!(&handle, Cassandra, self.backend_type())?;
        debug!(
            "Releasing {} session ({} references)",
            inner.backend_type(),
            Arc::strong_count(inner)
        );
        // 驱动没有显式关闭接口：最后一个 Session 释放时连接池和后台任务随之结束，
        // 仍在执行的查询持有的克隆会把这一时刻推迟到查询返回
        drop(handle);
        Ok(())
    }

    fn system_databases(&self) -> &[&'static str] {
        SYSTEM_KEYSPACES
    }

    async fn list_database_names(&self, handle: &BackendHandle) -> AdapterResult<Vec<String>> {
        let handle = expect_handle!(handle, Cassandra, self.backend_type())?;
        let rows = Self::fetch_rows(
            &handle.session,
            "SELECT keyspace_name FROM system_schema.keyspaces",
            (),
        )
        .await?;
        Ok(rows.iter().filter_map(|r| text_at(&r.columns, 0)).collect())
    }

    async fn list_collection_names(
        &self,
        handle: &BackendHandle,
        database: &str,
    ) -> AdapterResult<Vec<String>> {
        let handle = expect_handle!(handle, Cassandra, self.backend_type())?;
        let rows = Self::fetch_rows(
            &handle.session,
            "SELECT table_name FROM system_schema.tables WHERE keyspace_name = ?",
            (database,),
        )
        .await?;
        Ok(rows.iter().filter_map(|r| text_at(&r.columns, 0)).collect())
    }

    async fn collection_cardinality(
        &self,
        handle: &BackendHandle,
        database: &str,
        collection: &str,
    ) -> AdapterResult<u64> {
        let handle = expect_handle!(handle, Cassandra, self.backend_type())?;
        let rows = Self::fetch_rows(
            &handle.session,
            "SELECT column_name FROM system_schema.columns WHERE keyspace_name = ? AND table_name = ?",
            (database, collection),
        )
        .await?;
        Ok(rows.len() as u64)
    }

    async fn describe_collection(
        &self,
        handle: &BackendHandle,
        database: &str,
        collection: &str,
    ) -> AdapterResult<RawSchema> {
        let handle = expect_handle!(handle, Cassandra, self.backend_type())?;
        let rows = Self::fetch_rows(
            &handle.session,
            "SELECT column_name, type, kind, position, clustering_order \
             FROM system_schema.columns WHERE keyspace_name = ? AND table_name = ?",
            (database, collection),
        )
        .await?;

        let columns = rows
            .iter()
            .filter_map(|r| {
                let name = text_at(&r.columns, 0)?;
                Some(RawColumnDef {
                    name,
                    native_type: text_at(&r.columns, 1).unwrap_or_else(|| "unknown".to_string()),
                    kind: text_at(&r.columns, 2)
                        .map(|k| ColumnKind::parse(&k))
                        .unwrap_or(ColumnKind::Regular),
                    position: r
                        .columns
                        .get(3)
                        .and_then(|c| c.as_ref())
                        .and_then(|c| c.as_int())
                        .unwrap_or(-1),
                    clustering_order: text_at(&r.columns, 4),
                })
            })
            .collect();

        // 索引元数据缺失不影响列信息
        let indexes = match Self::fetch_rows(
            &handle.session,
            "SELECT index_name, options FROM system_schema.indexes \
             WHERE keyspace_name = ? AND table_name = ?",
            (database, collection),
        )
        .await
        {
            Ok(rows) => rows
                .iter()
                .filter_map(|r| {
                    let name = text_at(&r.columns, 0)?;
                    let options = match r.columns.get(1).and_then(|c| c.as_ref()) {
                        Some(CqlValue::Map(entries)) => entries
                            .iter()
                            .filter_map(|(k, v)| Some((k.as_text()?.clone(), v.as_text()?.clone())))
                            .collect(),
                        _ => BTreeMap::new(),
                    };
                    Some(RawIndexDef { name, options })
                })
                .collect(),
            Err(e) => {
                warn!(
                    "Could not get indexes for table {}.{}: {}",
                    database, collection, e
                );
                Vec::new()
            }
        };

        Ok(RawSchema { columns, indexes })
    }

    fn statement_policy(&self) -> StatementPolicy {
        StatementPolicy::SELECT_ONLY
    }

    async fn execute(
        &self,
        handle: &BackendHandle,
        request: &QueryRequest,
        page_size: u32,
    ) -> Result<RawPage, BackendError> {
        let handle = expect_handle!(handle, Cassandra, self.backend_type())
            .map_err(|e| BackendError::new(e.to_string()))?;
        let paging_state = request
            .page_state
            .as_ref()
            .map(decode_page_state)
            .transpose()?;

        let page_size = i32::try_from(page_size).unwrap_or(i32::MAX);
        let result = if request.parameters.is_empty() {
            let query = Query::new(request.text.clone()).with_page_size(page_size);
            handle.session.query_paged(query, (), paging_state).await
        } else {
            // 驱动按列类型校验绑定值，先预编译拿到参数元数据
            let mut prepared = handle
                .session
                .prepare(Query::new(request.text.clone()))
                .await
                .map_err(|e| errors::from_query_error(&e))?;
            prepared.set_page_size(page_size);
            let types: Vec<&ColumnType> = prepared
                .get_variable_col_specs()
                .iter()
                .map(|spec| &spec.typ)
                .collect();
            let values = bind_parameters(&request.parameters, &types)?;
            handle
                .session
                .execute_paged(&prepared, values, paging_state)
                .await
        }
        .map_err(|e| errors::from_query_error(&e))?;

        let columns: Vec<RawColumn> = result
            .col_specs
            .iter()
            .map(|spec| RawColumn {
                name: spec.name.clone(),
                native: native_from_column_type(&spec.typ),
            })
            .collect();

        let rows = result
            .rows
            .unwrap_or_default()
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, col)| {
                        let cell = row.columns.get(i).and_then(|c| c.as_ref());
                        (col.name.clone(), cql_to_json(cell))
                    })
                    .collect::<Row>()
            })
            .collect();

        Ok(RawPage {
            columns,
            rows,
            next_page_state: result.paging_state.as_ref().map(encode_page_state),
        })
    }

    fn leaf_type(&self, tag: &str) -> Option<CanonicalType> {
        cql_leaf_type(tag)
    }

    async fn system_info(&self, handle: &BackendHandle) -> AdapterResult<SystemInfo> {
        let handle = expect_handle!(handle, Cassandra, self.backend_type())?;
        let local = Self::fetch_rows(
            &handle.session,
            "SELECT release_version, cluster_name, data_center FROM system.local",
            (),
        )
        .await?;
        let peers = Self::fetch_rows(&handle.session, "SELECT peer FROM system.peers", ()).await?;

        let row = local
            .first()
            .ok_or_else(|| AdapterError::backend("system.local returned no rows"))?;
        let mut info = SystemInfo {
            version: text_at(&row.columns, 0).unwrap_or_else(|| "unknown".to_string()),
            cluster_name: text_at(&row.columns, 1),
            // 本地节点 + 对等节点
            nodes_count: Some(peers.len() as u64 + 1),
            ..Default::default()
        };
        if let Some(dc) = text_at(&row.columns, 2) {
            info.extra
                .insert("dataCenter".to_string(), serde_json::Value::String(dc));
        }
        if let Some(ks) = handle.keyspace() {
            info.extra
                .insert("keyspace".to_string(), serde_json::Value::String(ks.to_string()));
        }
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
            .iter()
            .filter_map(|idx| {
                let target = self.index_target(&idx.options)?;
                Some(IndexInfo {
                    name: idx.name.clone(),
                    column: target.column,
                    kind: target.kind,
                })
            })
            .collect())
    }
}
