//! 模式内省相关类型

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    pub name: String,
    /// 子集合数量；统计失败时为 None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInfo {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// 基数提示（Cassandra 表为列数，文档集合为字段数）；查询失败时为 None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents_count: Option<u64>,
}

/// 列在主键中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    PartitionKey,
    Clustering,
    Static,
    Regular,
}

impl ColumnKind {
    pub fn parse(kind: &str) -> Self {
        match kind.trim().to_ascii_lowercase().as_str() {
            "partition_key" => ColumnKind::PartitionKey,
            "clustering" => ColumnKind::Clustering,
            "static" => ColumnKind::Static,
            _ => ColumnKind::Regular,
        }
    }

    pub fn is_primary_key(&self) -> bool {
        matches!(self, ColumnKind::PartitionKey | ColumnKind::Clustering)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClusteringOrder {
    Asc,
    Desc,
}

impl ClusteringOrder {
    pub fn parse(order: &str) -> Self {
        if order.trim().eq_ignore_ascii_case("desc") {
            ClusteringOrder::Desc
        } else {
            ClusteringOrder::Asc
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub canonical_type: String,
    /// 后端原始类型字符串
    pub native_type: String,
    pub primary_key: bool,
    pub kind: ColumnKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clustering_order: Option<ClusteringOrder>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub name: String,
    pub column: String,
    /// keys / values / entries / full；普通索引为 None
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInfo {
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes_count: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// 适配器返回的原始列定义
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawColumnDef {
    pub name: String,
    /// 原生类型字符串，如 `map<text, int>`
    pub native_type: String,
    pub kind: ColumnKind,
    /// 在分区键/聚簇键中的位置
    pub position: i32,
    pub clustering_order: Option<String>,
}

/// 适配器返回的原始索引定义，options 保持后端编码
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawIndexDef {
    pub name: String,
    pub options: BTreeMap<String, String>,
}

/// 适配器返回的原始模式
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSchema {
    pub columns: Vec<RawColumnDef>,
    pub indexes: Vec<RawIndexDef>,
}

/// 解析后的索引目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTarget {
    pub column: String,
    pub kind: Option<String>,
}
