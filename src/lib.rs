//! polystore - 面向多种 NoSQL 后端的统一连接、内省与查询运行时
//!
//! 每个后端实现一次 `DatabaseAdapter` 契约；`Runtime` 负责会话管理、
//! 查询管道（语句策略、分页、类型规范化、错误分类）和查询历史审计。

pub mod adapters;
pub mod api;
pub mod audit;
pub mod config;
pub mod core;
pub mod query;
pub mod utils;

pub use api::Runtime;
