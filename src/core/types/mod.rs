//! 核心数据类型
//!
//! 适配器契约、会话管理和查询管道之间共享的数据模型。

pub mod backend;
pub mod canonical;
pub mod connection;
pub mod query;
pub mod schema;

pub use backend::{AdapterDescriptor, BackendType, Capabilities, QueryLanguage, SchemaType};
pub use canonical::{normalize_type, CanonicalType, NativeType};
pub use connection::{ConnectionConfig, ConnectionResult, ConnectionStatus, TestResult, TestStatus};
pub use query::{
    AggregationRequest, ColumnMeta, PageState, QueryRequest, QueryResult, RawColumn, RawPage, Row,
};
pub use schema::{
    ClusteringOrder, CollectionInfo, ColumnInfo, ColumnKind, DatabaseInfo, IndexInfo, IndexTarget,
    RawColumnDef, RawIndexDef, RawSchema, SchemaInfo, SystemInfo,
};
