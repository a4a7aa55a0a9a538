//! SQLite 历史存储
//!
//! 表结构：`query_history` 记录查询，`transaction_log` 记录连接生命周期操作。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;

use super::{AuditError, AuditSink, HistoryRecord, QueryRecord, QueryStatus};
use crate::core::types::{BackendType, QueryLanguage};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS query_history (
        id TEXT PRIMARY KEY,
        connection_id TEXT NOT NULL,
        database_type TEXT NOT NULL,
        query_language TEXT NOT NULL,
        query TEXT NOT NULL,
        status TEXT NOT NULL,
        execution_time INTEGER NOT NULL,
        row_count INTEGER NOT NULL DEFAULT 0,
        error TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_query_history_connection
        ON query_history (connection_id, created_at)",
    "CREATE TABLE IF NOT EXISTS transaction_log (
        id TEXT PRIMARY KEY,
        connection_id TEXT NOT NULL,
        database_type TEXT NOT NULL,
        operation TEXT NOT NULL,
        details TEXT,
        created_at TEXT NOT NULL
    )",
];

#[derive(Debug, Clone)]
pub struct SqliteAuditSink {
    pool: SqlitePool,
}

impl SqliteAuditSink {
    /// 打开（必要时创建）数据库文件并建表
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AuditError::Sink(format!("无法创建目录 {}: {}", parent.display(), e)))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let sink = Self::from_pool(pool).await?;
        info!("Query history stored in {}", path.display());
        Ok(sink)
    }

    /// 内存数据库，单连接
    pub async fn in_memory() -> Result<Self, AuditError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, AuditError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// 最近的查询历史，按时间倒序
    pub async fn recent_queries(
        &self,
        connection_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<QueryRecord>, AuditError> {
        let rows = match connection_id {
            Some(id) => {
                sqlx::query(
                    "SELECT * FROM query_history WHERE connection_id = ?
                     ORDER BY created_at DESC, rowid DESC LIMIT ?",
                )
                .bind(id)
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM query_history ORDER BY created_at DESC, rowid DESC LIMIT ?")
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(query_record_from_row).collect()
    }

    /// 某个连接的生命周期操作，按时间顺序
    pub async fn operations(&self, connection_id: &str) -> Result<Vec<String>, AuditError> {
        let rows = sqlx::query(
            "SELECT operation FROM transaction_log WHERE connection_id = ? ORDER BY created_at, rowid",
        )
        .bind(connection_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("operation").map_err(AuditError::from))
            .collect()
    }
}

fn query_record_from_row(row: &SqliteRow) -> Result<QueryRecord, AuditError> {
    let backend: String = row.try_get("database_type")?;
    let language: String = row.try_get("query_language")?;
    let status: String = row.try_get("status")?;
    Ok(QueryRecord {
        id: row.try_get("id")?,
        connection_id: row.try_get("connection_id")?,
        backend_type: backend.parse::<BackendType>().map_err(|t| {
            AuditError::Sink(format!("未知的后端类型: {}", t))
        })?,
        query_language: serde_json::from_value::<QueryLanguage>(serde_json::Value::String(language))
            .map_err(|e| AuditError::Sink(e.to_string()))?,
        query: row.try_get("query")?,
        status: if status == QueryStatus::Success.as_str() {
            QueryStatus::Success
        } else {
            QueryStatus::Error
        },
        execution_time_ms: row.try_get::<i64, _>("execution_time")?.max(0) as u64,
        row_count: row.try_get::<i64, _>("row_count")?.max(0) as usize,
        error: row.try_get("error")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn append(&self, record: &HistoryRecord) -> Result<(), AuditError> {
        match record {
            HistoryRecord::Query(q) => {
                sqlx::query(
                    "INSERT INTO query_history
                     (id, connection_id, database_type, query_language, query, status,
                      execution_time, row_count, error, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&q.id)
                .bind(&q.connection_id)
                .bind(q.backend_type.as_str())
                .bind(q.query_language.as_str())
                .bind(&q.query)
                .bind(q.status.as_str())
                .bind(i64::try_from(q.execution_time_ms).unwrap_or(i64::MAX))
                .bind(i64::try_from(q.row_count).unwrap_or(i64::MAX))
                .bind(q.error.as_deref())
                .bind(q.created_at)
                .execute(&self.pool)
                .await?;
            }
            HistoryRecord::Operation(o) => {
                sqlx::query(
                    "INSERT INTO transaction_log
                     (id, connection_id, database_type, operation, details, created_at)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(&o.id)
                .bind(&o.connection_id)
                .bind(o.backend_type.as_str())
                .bind(o.operation.as_str())
                .bind(o.details.as_ref().map(|d| d.to_string()))
                .bind(o.created_at)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }
}
