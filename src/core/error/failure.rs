//! 查询/连接失败的分类
//!
//! 驱动暴露结构化错误码时由适配器直接给出分类；否则退回到按错误文本匹配。
//! 文本匹配只是尽力而为，不保证覆盖所有后端的措辞。

use serde::{Deserialize, Serialize};
use std::fmt;

use super::codes::ErrorCode;

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    Timeout,
    ConnectionRefused,
    AuthenticationFailed,
    QuerySyntaxError,
    /// 被适配器的语句策略拒绝（例如只读模式下的 DROP）
    OperationNotAllowed,
    Unknown,
}

const TIMEOUT_PATTERNS: &[&str] = &["timed out", "timeout", "time out", "deadline exceeded"];

const REFUSED_PATTERNS: &[&str] = &[
    "connection refused",
    "econnrefused",
    "no route to host",
    "host unreachable",
    "network is unreachable",
    "all host(s) tried for query failed",
    "failed to resolve",
    "could not connect",
];

const AUTH_PATTERNS: &[&str] = &[
    "authentication",
    "bad credentials",
    "unauthorized",
    "provided username",
    "password",
    "access denied",
];

const SYNTAX_PATTERNS: &[&str] = &[
    "syntax error",
    "syntaxexception",
    "line 1:",
    "no viable alternative",
    "mismatched input",
    "unconfigured table",
    "undefined column",
    "invalid query",
    "unknown identifier",
];

impl FailureKind {
    /// 按错误文本匹配分类（尽力而为）
    ///
    /// 匹配顺序：超时 > 拒绝连接 > 认证 > 语法。超时排在最前，
    /// 因为驱动常把超时包在 "connection ..." 之类的文本里。
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let matches_any = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

        if matches_any(TIMEOUT_PATTERNS) {
            FailureKind::Timeout
        } else if matches_any(REFUSED_PATTERNS) {
            FailureKind::ConnectionRefused
        } else if matches_any(AUTH_PATTERNS) {
            FailureKind::AuthenticationFailed
        } else if matches_any(SYNTAX_PATTERNS) {
            FailureKind::QuerySyntaxError
        } else {
            FailureKind::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "Timeout",
            FailureKind::ConnectionRefused => "ConnectionRefused",
            FailureKind::AuthenticationFailed => "AuthenticationFailed",
            FailureKind::QuerySyntaxError => "QuerySyntaxError",
            FailureKind::OperationNotAllowed => "OperationNotAllowed",
            FailureKind::Unknown => "Unknown",
        }
    }

    /// 生成带分类前缀的错误文本，形如 `Timeout: ...`
    pub fn describe(&self, message: &str) -> String {
        format!("{}: {}", self.as_str(), message)
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            FailureKind::Timeout => ErrorCode::Timeout,
            FailureKind::ConnectionRefused => ErrorCode::ConnectionRefused,
            FailureKind::AuthenticationFailed => ErrorCode::Unauthorized,
            FailureKind::QuerySyntaxError => ErrorCode::SyntaxError,
            FailureKind::OperationNotAllowed => ErrorCode::Forbidden,
            FailureKind::Unknown => ErrorCode::ExecutionError,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
