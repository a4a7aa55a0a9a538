//! 后端类型与能力描述

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 受支持的后端类型（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Cassandra,
    ScyllaDb,
    MongoDb,
    DynamoDb,
    Redis,
    Couchbase,
    /// 进程内文档存储
    Memory,
}

impl BackendType {
    pub const ALL: [BackendType; 7] = [
        BackendType::Cassandra,
        BackendType::ScyllaDb,
        BackendType::MongoDb,
        BackendType::DynamoDb,
        BackendType::Redis,
        BackendType::Couchbase,
        BackendType::Memory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Cassandra => "cassandra",
            BackendType::ScyllaDb => "scylladb",
            BackendType::MongoDb => "mongodb",
            BackendType::DynamoDb => "dynamodb",
            BackendType::Redis => "redis",
            BackendType::Couchbase => "couchbase",
            BackendType::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase();
        BackendType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == token)
            .ok_or(token)
    }
}

/// 查询语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryLanguage {
    /// Cassandra Query Language
    Cql,
    /// MongoDB Query Language
    Mql,
    /// AWS DynamoDB
    Partiql,
    /// Redis commands
    Redis,
    /// Couchbase
    N1ql,
    /// 内存后端使用的 SELECT 子集
    SqlSubset,
}

impl QueryLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryLanguage::Cql => "cql",
            QueryLanguage::Mql => "mql",
            QueryLanguage::Partiql => "partiql",
            QueryLanguage::Redis => "redis",
            QueryLanguage::N1ql => "n1ql",
            QueryLanguage::SqlSubset => "sql-subset",
        }
    }
}

impl fmt::Display for QueryLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 模式约束类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaType {
    /// 无模式（Redis）
    Schemaless,
    /// 可选模式（MongoDB）
    SchemaOptional,
    /// 必须有模式（Cassandra）
    SchemaRequired,
}

/// 能力标志，声明式、只读
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_keyspaces: bool,
    pub supports_indexes: bool,
    pub supports_aggregation: bool,
    pub supports_transactions: bool,
    pub query_language: QueryLanguage,
    pub schema_type: SchemaType,
}

/// 适配器描述信息，注册后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterDescriptor {
    pub backend_type: BackendType,
    pub display_name: String,
    pub icon: String,
    pub capabilities: Capabilities,
}
