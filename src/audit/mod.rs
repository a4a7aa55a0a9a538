//! 审计与查询历史
//!
//! 查询管道和会话流程只把记录投递到有界队列；后台任务负责写入存储并做有限次重试。
//! 写入失败不会影响调用方拿到的结果。

use async_trait::async_trait;
use thiserror::Error;

pub mod history;
pub mod logger;
pub mod memory_sink;
#[cfg(feature = "sqlite-history")]
pub mod sqlite;

pub use history::{HistoryRecord, OperationKind, OperationRecord, QueryRecord, QueryStatus};
pub use logger::{AuditLogger, AuditStats};
pub use memory_sink::MemoryAuditSink;
#[cfg(feature = "sqlite-history")]
pub use sqlite::SqliteAuditSink;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("审计存储写入失败: {0}")]
    Sink(String),

    #[cfg(feature = "sqlite-history")]
    #[error("SQLite 错误: {0}")]
    Sqlite(#[from] sqlx::Error),
}

/// 只写的历史存储
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &HistoryRecord) -> Result<(), AuditError>;
}
