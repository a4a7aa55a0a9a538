//! 适配器层错误类型
//!
//! 后端驱动返回的原始错误在这里被包装成 `BackendError`，
//! 携带可选的结构化分类，供查询管道和连接流程统一处理。

use thiserror::Error;

use crate::core::error::failure::FailureKind;
use crate::core::types::BackendType;

/// 适配器操作结果类型别名
pub type AdapterResult<T> = Result<T, AdapterError>;

/// 后端返回的原始错误
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct BackendError {
    /// 驱动提供的结构化分类；为 None 时按文本匹配
    pub kind: Option<FailureKind>,
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: None,
            message: message.into(),
        }
    }

    pub fn classified(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            message: message.into(),
        }
    }

    /// 结构化分类优先，其次按文本匹配
    pub fn classify(&self) -> FailureKind {
        self.kind
            .unwrap_or_else(|| FailureKind::from_message(&self.message))
    }
}

/// 适配器相关错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("连接失败: {0}")]
    Connection(BackendError),

    #[error("后端错误: {0}")]
    Backend(BackendError),

    #[error("无效的连接配置: {0}")]
    InvalidConfig(String),

    #[error("{backend} 不支持操作: {operation}")]
    Unsupported {
        backend: BackendType,
        operation: &'static str,
    },

    #[error("会话句柄类型不匹配: 期望 {expected}, 实际 {actual}")]
    HandleMismatch {
        expected: BackendType,
        actual: BackendType,
    },
}

impl AdapterError {
    pub fn backend(message: impl Into<String>) -> Self {
        AdapterError::Backend(BackendError::new(message))
    }

    pub fn connection(message: impl Into<String>) -> Self {
        AdapterError::Connection(BackendError::new(message))
    }
}

impl From<BackendError> for AdapterError {
    fn from(e: BackendError) -> Self {
        AdapterError::Backend(e)
    }
}
