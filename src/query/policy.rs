//! 语句策略
//!
//! 适配器可以声明只允许只读语句。检查只看第一个关键字，跳过前导空白和注释。

/// 语句策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementPolicy {
    /// 不做限制
    Unrestricted,
    /// 只允许以给定关键字开头的语句（大小写不敏感）
    ReadOnly { allowed: &'static [&'static str] },
}

/// 拒绝原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    EmptyStatement,
    /// 语句不以关键字开头，`token` 是开头的非空白片段
    UnrecognizedStatement { token: String },
    Disallowed { keyword: String },
}

impl PolicyViolation {
    pub fn message(&self, allowed: &[&str]) -> String {
        match self {
            PolicyViolation::EmptyStatement => "Query text is empty".to_string(),
            PolicyViolation::UnrecognizedStatement { token } => {
                format!("Syntax error: statement must start with a keyword (got {})", token)
            }
            PolicyViolation::Disallowed { keyword } => {
                let allowed: Vec<String> = allowed.iter().map(|k| k.to_ascii_uppercase()).collect();
                format!(
                    "Only {} queries are allowed (got {})",
                    allowed.join("/"),
                    keyword.to_ascii_uppercase()
                )
            }
        }
    }
}

impl StatementPolicy {
    pub const SELECT_ONLY: StatementPolicy = StatementPolicy::ReadOnly {
        allowed: &["select"],
    };

    pub fn is_read_only(&self) -> bool {
        matches!(self, StatementPolicy::ReadOnly { .. })
    }

    pub fn check(&self, statement: &str) -> Result<(), PolicyViolation> {
        let rest = skip_comments(statement);
        if rest.is_empty() {
            return Err(PolicyViolation::EmptyStatement);
        }
        let keyword = leading_word(rest);
        if keyword.is_empty() {
            return Err(PolicyViolation::UnrecognizedStatement {
                token: leading_token(rest).to_string(),
            });
        }
        match self {
            StatementPolicy::Unrestricted => Ok(()),
            StatementPolicy::ReadOnly { allowed } => {
                if allowed.iter().any(|k| k.eq_ignore_ascii_case(keyword)) {
                    Ok(())
                } else {
                    Err(PolicyViolation::Disallowed {
                        keyword: keyword.to_string(),
                    })
                }
            }
        }
    }

    pub fn allowed_keywords(&self) -> &'static [&'static str] {
        match self {
            StatementPolicy::Unrestricted => &[],
            StatementPolicy::ReadOnly { allowed } => *allowed,
        }
    }
}

/// 跳过空白和注释（`--`、`//`、`/* */`）
fn skip_comments(statement: &str) -> &str {
    let mut rest = statement;
    loop {
        rest = rest.trim_start();
        if rest.starts_with("--") || rest.starts_with("//") {
            rest = match rest.find('\n') {
                Some(pos) => &rest[pos + 1..],
                None => "",
            };
        } else if let Some(body) = rest.strip_prefix("/*") {
            rest = match body.find("*/") {
                Some(pos) => &body[pos + 2..],
                None => "",
            };
        } else {
            return rest;
        }
    }
}

fn leading_word(rest: &str) -> &str {
    let end = rest
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(rest.len());
    &rest[..end]
}

fn leading_token(rest: &str) -> &str {
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    &rest[..end]
}
