//! 统一错误处理系统
//!
//! ## 设计理念
//!
//! 1. **异常与数据分离**：调用方/配置错误（未知后端、未知会话、不支持的能力）
//!    以 `Err(RuntimeError)` 返回；查询运行时失败是数据，编码在
//!    `QueryResult.error` 中，绝不以 `Err` 返回。
//!
//! 2. **分层转换**：会话与适配器错误使用 `#[from]` 自动转换为 `RuntimeError`。
//!
//! 3. **统一接口**：`RuntimeResult<T>` 提供统一的返回类型。

use thiserror::Error;

pub mod adapter;
pub mod codes;
pub mod failure;
pub mod session;

pub use adapter::{AdapterError, AdapterResult, BackendError};
pub use codes::{ErrorCode, PublicError, ToPublicError};
pub use failure::FailureKind;
pub use session::{SessionError, SessionGone, SessionResult};

use crate::core::types::BackendType;

/// 运行时对调用方暴露的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("未找到后端适配器: {requested}. 可用: {}", available.join(", "))]
    AdapterNotFound {
        requested: String,
        available: Vec<String>,
    },

    #[error("会话不存在: {id} ({reason})")]
    SessionNotFound { id: String, reason: SessionGone },

    #[error("超过最大会话数限制: {0}")]
    SessionLimitExceeded(usize),

    #[error("连接失败 [{kind}]: {message}")]
    Connection { kind: FailureKind, message: String },

    #[error("{backend} 不支持操作: {operation}")]
    UnsupportedOperation {
        backend: BackendType,
        operation: &'static str,
    },

    #[error("后端错误 [{kind}]: {message}")]
    Backend { kind: FailureKind, message: String },

    #[error("无效的连接配置: {0}")]
    InvalidConfig(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的结果类型
pub type RuntimeResult<T> = Result<T, RuntimeError>;

impl From<SessionError> for RuntimeError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::SessionNotFound { id, reason } => {
                RuntimeError::SessionNotFound { id, reason }
            }
            SessionError::MaxSessionsExceeded(n) => RuntimeError::SessionLimitExceeded(n),
        }
    }
}

impl From<AdapterError> for RuntimeError {
    fn from(e: AdapterError) -> Self {
        match e {
            AdapterError::Connection(be) => RuntimeError::Connection {
                kind: be.classify(),
                message: be.message,
            },
            AdapterError::Backend(be) => RuntimeError::Backend {
                kind: be.classify(),
                message: be.message,
            },
            AdapterError::InvalidConfig(msg) => RuntimeError::InvalidConfig(msg),
            AdapterError::Unsupported { backend, operation } => {
                RuntimeError::UnsupportedOperation { backend, operation }
            }
            e @ AdapterError::HandleMismatch { .. } => RuntimeError::Internal(e.to_string()),
        }
    }
}

impl RuntimeError {
    pub fn is_session_not_found(&self) -> bool {
        matches!(self, RuntimeError::SessionNotFound { .. })
    }

    /// 对外稳定的数字错误码
    pub fn error_code(&self) -> ErrorCode {
        self.to_error_code()
    }
}

impl ToPublicError for RuntimeError {
    fn to_error_code(&self) -> ErrorCode {
        match self {
            RuntimeError::AdapterNotFound { .. } => ErrorCode::ResourceNotFound,
            RuntimeError::SessionNotFound { .. } => ErrorCode::ResourceNotFound,
            RuntimeError::SessionLimitExceeded(_) => ErrorCode::ResourceExhausted,
            RuntimeError::Connection { kind, .. } => kind.error_code(),
            RuntimeError::UnsupportedOperation { .. } => ErrorCode::ResourceUnavailable,
            RuntimeError::Backend { kind, .. } => kind.error_code(),
            RuntimeError::InvalidConfig(_) => ErrorCode::InvalidInput,
            RuntimeError::Internal(_) => ErrorCode::InternalError,
        }
    }

    fn to_public_message(&self) -> String {
        match self {
            RuntimeError::Internal(_) => ErrorCode::InternalError.default_message().to_string(),
            other => other.to_string(),
        }
    }
}
