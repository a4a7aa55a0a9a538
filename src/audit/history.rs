//! 审计记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::{BackendType, QueryLanguage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Success,
    Error,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Success => "success",
            QueryStatus::Error => "error",
        }
    }
}

/// 会话生命周期操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Connect,
    Disconnect,
    /// 被空闲回收
    Expire,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Connect => "CONNECT",
            OperationKind::Disconnect => "DISCONNECT",
            OperationKind::Expire => "EXPIRE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecord {
    pub id: String,
    pub connection_id: String,
    pub backend_type: BackendType,
    pub query_language: QueryLanguage,
    pub query: String,
    pub status: QueryStatus,
    pub execution_time_ms: u64,
    pub row_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub id: String,
    pub connection_id: String,
    pub backend_type: BackendType,
    pub operation: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// 只追加的历史记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HistoryRecord {
    Query(QueryRecord),
    Operation(OperationRecord),
}

impl HistoryRecord {
    pub fn query(
        connection_id: &str,
        backend_type: BackendType,
        query_language: QueryLanguage,
        query: &str,
        execution_time_ms: u64,
        outcome: Result<usize, String>,
    ) -> Self {
        let (status, row_count, error) = match outcome {
            Ok(rows) => (QueryStatus::Success, rows, None),
            Err(e) => (QueryStatus::Error, 0, Some(e)),
        };
        HistoryRecord::Query(QueryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            connection_id: connection_id.to_string(),
            backend_type,
            query_language,
            query: query.to_string(),
            status,
            execution_time_ms,
            row_count,
            error,
            created_at: Utc::now(),
        })
    }

    pub fn operation(
        connection_id: &str,
        backend_type: BackendType,
        operation: OperationKind,
        details: Option<serde_json::Value>,
    ) -> Self {
        HistoryRecord::Operation(OperationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            connection_id: connection_id.to_string(),
            backend_type,
            operation,
            details,
            created_at: Utc::now(),
        })
    }

    pub fn connection_id(&self) -> &str {
        match self {
            HistoryRecord::Query(q) => &q.connection_id,
            HistoryRecord::Operation(o) => &o.connection_id,
        }
    }
}
