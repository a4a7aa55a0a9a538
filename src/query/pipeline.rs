//! 查询执行管道
//!
//! 语句策略检查 -> 分页参数 -> 执行 -> 列类型规范化 -> 错误分类 -> 审计投递。
//! 查询本身的失败作为数据写入 `QueryResult`，不会以 `Err` 返回。

use log::debug;
use std::sync::Arc;
use std::time::Instant;

use super::policy::PolicyViolation;
use crate::adapters::DatabaseAdapter;
use crate::api::session::SessionSlot;
use crate::audit::{AuditLogger, HistoryRecord};
use crate::config::QueryConfig;
use crate::core::error::{BackendError, FailureKind};
use crate::core::types::{normalize_type, ColumnMeta, QueryRequest, QueryResult, RawColumn};

pub struct QueryPipeline {
    config: QueryConfig,
    audit: Arc<AuditLogger>,
}

impl QueryPipeline {
    pub fn new(config: QueryConfig, audit: Arc<AuditLogger>) -> Self {
        Self { config, audit }
    }

    /// 未指定时取默认值，并限制在 `[1, max_page_size]`
    pub fn effective_page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size.max(1))
    }

    pub async fn run(
        &self,
        adapter: &dyn DatabaseAdapter,
        slot: &SessionSlot,
        request: &QueryRequest,
    ) -> QueryResult {
        let started = Instant::now();
        let outcome = self.execute(adapter, slot, request).await;
        let elapsed = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(result) => QueryResult {
                execution_time_ms: elapsed,
                ..result
            },
            Err(err) => {
                let kind = err.classify();
                debug!(
                    "Query on session {} failed [{}]: {}",
                    slot.id(),
                    kind,
                    err.message
                );
                QueryResult::failure(kind, &err.message, elapsed)
            }
        };

        let backend = slot.backend_type().as_str();
        let status = if result.success { "success" } else { "error" };
        metrics::counter!("polystore_queries_total", "backend" => backend, "status" => status)
            .increment(1);
        metrics::histogram!("polystore_query_duration_ms", "backend" => backend)
            .record(elapsed as f64);

        self.audit.record(HistoryRecord::query(
            slot.id(),
            slot.backend_type(),
            adapter.descriptor().capabilities.query_language,
            &request.text,
            elapsed,
            match &result.error {
                None => Ok(result.row_count),
                Some(e) => Err(e.clone()),
            },
        ));

        result
    }

    async fn execute(
        &self,
        adapter: &dyn DatabaseAdapter,
        slot: &SessionSlot,
        request: &QueryRequest,
    ) -> Result<QueryResult, BackendError> {
        let policy = adapter.statement_policy();
        policy.check(&request.text).map_err(|violation| {
            let kind = match violation {
                PolicyViolation::EmptyStatement
                | PolicyViolation::UnrecognizedStatement { .. } => FailureKind::QuerySyntaxError,
                PolicyViolation::Disallowed { .. } => FailureKind::OperationNotAllowed,
            };
            BackendError::classified(kind, violation.message(policy.allowed_keywords()))
        })?;

        let page_size = self.effective_page_size(request.page_size);
        let page = adapter.execute(slot.handle(), request, page_size).await?;
        let columns = normalize_columns(adapter, &page.columns);

        Ok(QueryResult::success(
            page.rows,
            columns,
            page.next_page_state,
            0,
        ))
    }
}

/// 把原始列的原生类型规范化
pub fn normalize_columns(adapter: &dyn DatabaseAdapter, columns: &[RawColumn]) -> Vec<ColumnMeta> {
    let leaf = |tag: &str| adapter.leaf_type(tag);
    columns
        .iter()
        .map(|c| ColumnMeta {
            name: c.name.clone(),
            canonical_type: normalize_type(&c.native, &leaf).to_string(),
        })
        .collect()
}
