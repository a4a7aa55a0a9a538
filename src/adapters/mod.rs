//! 后端适配器
//!
//! 每个受支持的存储系统实现一次 `DatabaseAdapter` 契约。适配器自身不保存任何
//! 按连接划分的状态：连接句柄由会话管理器持有，每次调用时传入。
//!
//! 可选操作（索引列表、聚合）带有返回 `Unsupported` 的默认实现；运行时在分发前
//! 先检查能力标志，而不是在调用时探测方法是否存在。

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub mod memory;
pub mod registry;

#[cfg(feature = "cassandra")]
pub mod cassandra;

pub use registry::AdapterRegistry;

use crate::core::error::{AdapterError, AdapterResult, BackendError};
use crate::core::types::{
    AdapterDescriptor, AggregationRequest, BackendType, CanonicalType, ConnectionConfig,
    IndexInfo, IndexTarget, QueryRequest, RawPage, RawSchema, SystemInfo,
};
use crate::query::policy::StatementPolicy;

/// 会话独占的后端连接句柄（封闭集合）
#[derive(Clone)]
pub enum BackendHandle {
    #[cfg(feature = "cassandra")]
    Cassandra(Arc<cassandra::CassandraHandle>),
    Memory(Arc<memory::MemoryHandle>),
}

impl BackendHandle {
    /// 句柄对应的后端类型
    pub fn backend_type(&self) -> BackendType {
        match self {
            #[cfg(feature = "cassandra")]
            BackendHandle::Cassandra(h) => h.backend_type(),
            BackendHandle::Memory(_) => BackendType::Memory,
        }
    }
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BackendHandle({})", self.backend_type())
    }
}

/// 适配器契约
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// 注册时使用的描述信息
    fn descriptor(&self) -> &AdapterDescriptor;

    fn backend_type(&self) -> BackendType {
        self.descriptor().backend_type
    }

    /// 打开一个后端原生连接
    async fn open(&self, config: &ConnectionConfig) -> AdapterResult<BackendHandle>;

    /// 释放句柄
    async fn close(&self, handle: BackendHandle) -> AdapterResult<()>;

    /// 需要从数据库列表中排除的内部容器
    fn system_databases(&self) -> &[&'static str] {
        &[]
    }

    async fn list_database_names(&self, handle: &BackendHandle) -> AdapterResult<Vec<String>>;

    async fn list_collection_names(
        &self,
        handle: &BackendHandle,
        database: &str,
    ) -> AdapterResult<Vec<String>>;

    /// 单个集合的基数提示（列数/字段数），每个集合独立查询
    async fn collection_cardinality(
        &self,
        handle: &BackendHandle,
        database: &str,
        collection: &str,
    ) -> AdapterResult<u64>;

    async fn describe_collection(
        &self,
        handle: &BackendHandle,
        database: &str,
        collection: &str,
    ) -> AdapterResult<RawSchema>;

    /// 语句策略（例如只允许 SELECT）
    fn statement_policy(&self) -> StatementPolicy {
        StatementPolicy::Unrestricted
    }

    /// 执行一页查询；page_state 原样传给驱动
    async fn execute(
        &self,
        handle: &BackendHandle,
        request: &QueryRequest,
        page_size: u32,
    ) -> Result<RawPage, BackendError>;

    /// 原生标量类型标签 -> 规范化类型
    fn leaf_type(&self, tag: &str) -> Option<CanonicalType>;

    /// 解析索引 options 中的目标列，无法解析时返回 None
    fn index_target(&self, options: &BTreeMap<String, String>) -> Option<IndexTarget> {
        options.get("target").and_then(|t| parse_index_target(t))
    }

    async fn system_info(&self, handle: &BackendHandle) -> AdapterResult<SystemInfo>;

    async fn list_indexes(
        &self,
        _handle: &BackendHandle,
        _database: &str,
        _collection: &str,
    ) -> AdapterResult<Vec<IndexInfo>> {
        Err(AdapterError::Unsupported {
            backend: self.backend_type(),
            operation: "list_indexes",
        })
    }

    async fn execute_aggregation(
        &self,
        _handle: &BackendHandle,
        _request: &AggregationRequest,
    ) -> Result<RawPage, BackendError> {
        Err(BackendError::new(format!(
            "aggregation is not supported by {}",
            self.backend_type()
        )))
    }
}

/// 解析索引目标字符串
///
/// 支持的写法：`col`、`"Col"`、`keys(col)`、`values(col)`、`entries(col)`、`full(col)`。
/// 多列目标（如 SASI 的 `a,b`）和空目标视为无法解析。
pub fn parse_index_target(raw: &str) -> Option<IndexTarget> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (kind, inner) = match (trimmed.find('('), trimmed.ends_with(')')) {
        (Some(open), true) => {
            let func = trimmed[..open].trim().to_ascii_lowercase();
            if !matches!(func.as_str(), "keys" | "values" | "entries" | "full") {
                return None;
            }
            (Some(func), &trimmed[open + 1..trimmed.len() - 1])
        }
        (None, false) => (None, trimmed),
        _ => return None,
    };

    let column: String = inner
        .trim()
        .chars()
        .filter(|c| *c != '"' && *c != '\'')
        .collect();
    if column.is_empty() || column.contains(',') || column.contains(['(', ')']) {
        return None;
    }
    Some(IndexTarget { column, kind })
}

/// 从句柄中取出指定变体，类型不匹配时报错
macro_rules! expect_handle {
    ($handle:expr, $variant:ident, $expected:expr) => {
        match $handle {
            $crate::adapters::BackendHandle::$variant(inner) => Ok(inner),
            #[allow(unreachable_patterns)]
            other => Err($crate::core::error::AdapterError::HandleMismatch {
                expected: $expected,
                actual: other.backend_type(),
            }),
        }
    };
}
pub(crate) use expect_handle;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_quoted_targets() {
        assert_eq!(
            parse_index_target("email"),
            Some(IndexTarget {
                column: "email".to_string(),
                kind: None
            })
        );
        assert_eq!(
            parse_index_target("\"UserName\"").map(|t| t.column),
            Some("UserName".to_string())
        );
    }

    #[test]
    fn test_parse_function_targets() {
        let target = parse_index_target("keys(attributes)").expect("keys target");
        assert_eq!(target.column, "attributes");
        assert_eq!(target.kind.as_deref(), Some("keys"));

        let target = parse_index_target("ENTRIES(\"Tags\")").expect("entries target");
        assert_eq!(target.column, "Tags");
        assert_eq!(target.kind.as_deref(), Some("entries"));
    }

    #[test]
    fn test_unparsable_targets_are_rejected() {
        assert!(parse_index_target("").is_none());
        assert!(parse_index_target("   ").is_none());
        assert!(parse_index_target("a,b").is_none());
        assert!(parse_index_target("frobnicate(x)").is_none());
        assert!(parse_index_target("keys(").is_none());
        assert!(parse_index_target("values()").is_none());
    }
}
