// Query module
//
// 查询执行管道、语句策略和模式内省

pub mod introspection;
pub mod pipeline;
pub mod policy;

pub use introspection::SchemaIntrospector;
pub use pipeline::{normalize_columns, QueryPipeline};
pub use policy::{PolicyViolation, StatementPolicy};
