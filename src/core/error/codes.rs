//! 对外错误码定义
//!
//! 供上层传输层（HTTP/GraphQL 等）把运行时错误映射为稳定的数字码。
//!
//! 错误码格式: XXYY
//! - XX: 错误类别 (00=成功, 01=语法, 02=执行, 03=验证, 04=权限, 05=资源, 09=系统)
//! - YY: 具体错误

use serde::{Deserialize, Serialize};

/// 对外错误码
///
/// 错误码一旦定义不应随意修改，保证客户端兼容性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    Success = 0,

    // ==================== 语法错误 (01xx) ====================
    /// 查询语法错误
    SyntaxError = 100,

    // ==================== 执行错误 (02xx) ====================
    /// 通用执行错误
    ExecutionError = 200,
    /// 执行超时
    Timeout = 201,
    /// 资源不足（会话数达到上限）
    ResourceExhausted = 202,
    /// 后端拒绝连接
    ConnectionRefused = 205,

    // ==================== 验证错误 (03xx) ====================
    /// 无效输入（连接配置不完整等）
    InvalidInput = 302,

    // ==================== 权限错误 (04xx) ====================
    /// 操作被策略拒绝
    Forbidden = 403,
    /// 后端认证失败
    Unauthorized = 401,

    // ==================== 资源错误 (05xx) ====================
    /// 资源未找到（会话、适配器）
    ResourceNotFound = 500,
    /// 资源不可用（后端不支持该能力）
    ResourceUnavailable = 502,

    // ==================== 系统错误 (09xx) ====================
    /// 内部错误
    InternalError = 900,
    /// 未知错误
    Unknown = 999,
}

impl ErrorCode {
    /// 获取错误码的 i32 值
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// 根据 i32 值获取错误码
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(ErrorCode::Success),
            100 => Some(ErrorCode::SyntaxError),
            200 => Some(ErrorCode::ExecutionError),
            201 => Some(ErrorCode::Timeout),
            202 => Some(ErrorCode::ResourceExhausted),
            205 => Some(ErrorCode::ConnectionRefused),
            302 => Some(ErrorCode::InvalidInput),
            401 => Some(ErrorCode::Unauthorized),
            403 => Some(ErrorCode::Forbidden),
            500 => Some(ErrorCode::ResourceNotFound),
            502 => Some(ErrorCode::ResourceUnavailable),
            900 => Some(ErrorCode::InternalError),
            999 => Some(ErrorCode::Unknown),
            _ => None,
        }
    }

    /// 获取默认的错误消息
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Success => "成功",
            ErrorCode::SyntaxError => "语法错误",
            ErrorCode::ExecutionError => "执行错误",
            ErrorCode::Timeout => "执行超时",
            ErrorCode::ResourceExhausted => "资源不足",
            ErrorCode::ConnectionRefused => "连接被拒绝",
            ErrorCode::InvalidInput => "无效输入",
            ErrorCode::Unauthorized => "认证失败",
            ErrorCode::Forbidden => "禁止执行",
            ErrorCode::ResourceNotFound => "资源未找到",
            ErrorCode::ResourceUnavailable => "资源不可用",
            ErrorCode::InternalError => "内部错误",
            ErrorCode::Unknown => "未知错误",
        }
    }

    /// 判断是否为调用方错误
    pub fn is_client_error(&self) -> bool {
        let code = self.as_i32();
        (100..=199).contains(&code) || (300..=599).contains(&code)
    }

    /// 判断错误是否可重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::Timeout | ErrorCode::ConnectionRefused | ErrorCode::ResourceExhausted
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.as_i32(), self.default_message())
    }
}

/// 对外错误信息 - 用于序列化到响应中
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicError {
    pub code: ErrorCode,
    pub message: String,
}

impl PublicError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// 内部错误到对外错误的转换 trait
pub trait ToPublicError {
    fn to_public_error(&self) -> PublicError {
        PublicError::new(self.to_error_code(), self.to_public_message())
    }

    fn to_error_code(&self) -> ErrorCode;

    fn to_public_message(&self) -> String;
}
