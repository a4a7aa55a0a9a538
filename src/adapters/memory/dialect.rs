//! 内存后端的查询方言
//!
//! ```text
//! SELECT * | field[, field...] FROM [database.]collection
//!     [WHERE field = literal | ?]
//!     [LIMIT n] [;]
//! ```
//!
//! 字面量支持单引号字符串、数字、true/false/null；`?` 依次绑定请求参数。

use regex::Regex;
use std::sync::OnceLock;

use crate::core::error::{BackendError, FailureKind};

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Fields(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub projection: Projection,
    pub database: Option<String>,
    pub collection: String,
    pub filter: Option<(String, serde_json::Value)>,
    pub limit: Option<usize>,
}

fn select_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)^\s*select\s+(?P<proj>\*|\w+(?:\s*,\s*\w+)*)\s+from\s+(?P<target>\w+(?:\.\w+)?)(?:\s+where\s+(?P<field>\w+)\s*=\s*(?P<value>\?|'[^']*'|-?\d+(?:\.\d+)?|true|false|null))?(?:\s+limit\s+(?P<limit>\d+))?\s*;?\s*$",
        )
        .expect("select grammar is a valid regex")
    })
}

fn syntax_error(message: impl Into<String>) -> BackendError {
    BackendError::classified(FailureKind::QuerySyntaxError, message)
}

/// 解析一条 SELECT 语句
pub fn parse_select(text: &str, parameters: &[serde_json::Value]) -> Result<SelectStatement, BackendError> {
    let caps = select_regex().captures(text).ok_or_else(|| {
        let snippet: String = text.trim().chars().take(40).collect();
        syntax_error(format!("line 1: syntax error near '{}'", snippet))
    })?;

    let projection = match caps.name("proj").map(|m| m.as_str()) {
        Some("*") | None => Projection::All,
        Some(list) => Projection::Fields(list.split(',').map(|f| f.trim().to_string()).collect()),
    };

    let target = caps.name("target").map(|m| m.as_str()).unwrap_or_default();
    let (database, collection) = match target.split_once('.') {
        Some((db, coll)) => (Some(db.to_string()), coll.to_string()),
        None => (None, target.to_string()),
    };

    let filter = match (caps.name("field"), caps.name("value")) {
        (Some(field), Some(value)) => {
            Some((field.as_str().to_string(), parse_literal(value.as_str(), parameters)?))
        }
        _ => None,
    };

    let limit = match caps.name("limit") {
        Some(m) => Some(
            m.as_str()
                .parse::<usize>()
                .map_err(|e| syntax_error(format!("invalid LIMIT: {}", e)))?,
        ),
        None => None,
    };

    Ok(SelectStatement {
        projection,
        database,
        collection,
        filter,
        limit,
    })
}

fn parse_literal(raw: &str, parameters: &[serde_json::Value]) -> Result<serde_json::Value, BackendError> {
    if raw == "?" {
        return parameters
            .first()
            .cloned()
            .ok_or_else(|| syntax_error("missing bind parameter for '?'"));
    }
    if let Some(inner) = raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return Ok(serde_json::Value::String(inner.to_string()));
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" => return Ok(serde_json::Value::Bool(true)),
        "false" => return Ok(serde_json::Value::Bool(false)),
        "null" => return Ok(serde_json::Value::Null),
        _ => {}
    }
    serde_json::from_str::<serde_json::Value>(raw)
        .map_err(|e| syntax_error(format!("invalid literal {}: {}", raw, e)))
}

/// 比较过滤值，整数与浮点数按数值相等比较
pub fn values_equal(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}
