//! 查询请求与查询结果

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::error::FailureKind;
use crate::core::types::canonical::NativeType;

/// 一行结果：列名 -> 值，保持列顺序
pub type Row = serde_json::Map<String, serde_json::Value>;

/// 不透明的分页游标
///
/// 由同一适配器/会话生成，运行时从不检查其内部结构。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageState(String);

impl PageState {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 查询请求
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(alias = "query")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_state: Option<PageState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<serde_json::Value>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_page_state(mut self, page_state: Option<PageState>) -> Self {
        self.page_state = page_state;
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<serde_json::Value>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// 结果列描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    /// 规范化类型名
    #[serde(rename = "type")]
    pub canonical_type: String,
}

/// 查询结果
///
/// 不变式：`success == false` 时 `rows` 为空且 `error` 存在；
/// `success == true` 时 `columns` 精确描述 `rows` 的结构。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub success: bool,
    #[serde(rename = "results")]
    pub rows: Vec<Row>,
    pub columns: Vec<ColumnMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_state: Option<PageState>,
    pub execution_time_ms: u64,
    pub row_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
}

impl QueryResult {
    pub fn success(
        rows: Vec<Row>,
        columns: Vec<ColumnMeta>,
        page_state: Option<PageState>,
        execution_time_ms: u64,
    ) -> Self {
        let row_count = rows.len();
        Self {
            success: true,
            rows,
            columns,
            page_state,
            execution_time_ms,
            row_count,
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(kind: FailureKind, message: &str, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            rows: Vec::new(),
            columns: Vec::new(),
            page_state: None,
            execution_time_ms,
            row_count: 0,
            error: Some(kind.describe(message)),
            error_kind: Some(kind),
        }
    }

    pub fn has_more(&self) -> bool {
        self.page_state.is_some()
    }
}

/// 后端返回的原始列，类型尚未规范化
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub name: String,
    pub native: NativeType,
}

/// 后端返回的一页原始结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPage {
    pub columns: Vec<RawColumn>,
    pub rows: Vec<Row>,
    pub next_page_state: Option<PageState>,
}

/// 聚合请求（仅对声明 supports_aggregation 的后端有效）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationRequest {
    #[serde(default)]
    pub database: Option<String>,
    pub collection: String,
    pub pipeline: Vec<serde_json::Value>,
}
