//! 会话错误类型
//!
//! 涵盖会话管理相关的错误

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::error::codes::{ErrorCode, ToPublicError};

/// 会话操作结果类型别名
pub type SessionResult<T> = Result<T, SessionError>;

/// 会话找不到的原因
///
/// 已销毁的会话 ID 不会被复用，调用方据此区分 "连接已过期/已关闭" 与 "从未存在"。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionGone {
    /// 从未创建过（或墓碑记录已被淘汰）
    Unknown,
    /// 调用方主动断开
    Closed,
    /// 被空闲回收策略回收
    Expired,
}

impl fmt::Display for SessionGone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionGone::Unknown => write!(f, "unknown"),
            SessionGone::Closed => write!(f, "closed"),
            SessionGone::Expired => write!(f, "expired"),
        }
    }
}

/// 会话相关错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("会话不存在: {id} ({reason})")]
    SessionNotFound { id: String, reason: SessionGone },

    #[error("超过最大会话数限制: {0}")]
    MaxSessionsExceeded(usize),
}

impl SessionError {
    pub fn not_found(id: impl Into<String>, reason: SessionGone) -> Self {
        SessionError::SessionNotFound {
            id: id.into(),
            reason,
        }
    }
}

impl ToPublicError for SessionError {
    fn to_error_code(&self) -> ErrorCode {
        match self {
            SessionError::SessionNotFound { .. } => ErrorCode::ResourceNotFound,
            SessionError::MaxSessionsExceeded(_) => ErrorCode::ResourceExhausted,
        }
    }

    fn to_public_message(&self) -> String {
        self.to_string()
    }
}
