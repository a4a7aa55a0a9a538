//! 规范化类型系统
//!
//! 后端原生的列类型标签（如 CQL 的 `varchar`、`map<text, int>`）被映射为与后端无关的
//! 语义类型名。映射是全函数：任何无法识别的标签都落到 `unknown`，而不是报错。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 类型字符串允许的最大嵌套层数
pub const MAX_TYPE_DEPTH: usize = 32;

/// 后端原生类型树
///
/// 叶子是一个标签；集合类型带有参数，例如 `map<text, list<int>>` 表示为
/// `map(text, list(int))`。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeType {
    pub tag: String,
    pub params: Vec<NativeType>,
}

impl NativeType {
    pub fn leaf(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(tag: impl Into<String>, params: Vec<NativeType>) -> Self {
        Self {
            tag: tag.into(),
            params,
        }
    }

    /// 解析 `name<arg, arg>` 形式的类型字符串（CQL 等使用的写法）
    ///
    /// 引号会被去掉，空白会被忽略。括号不平衡或嵌套超过
    /// [`MAX_TYPE_DEPTH`] 层时返回 None。
    pub fn parse(input: &str) -> Option<Self> {
        let cleaned: String = input
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '"' && *c != '\'')
            .collect();
        if cleaned.is_empty() {
            return None;
        }
        let (ty, rest) = Self::parse_inner(&cleaned, 0)?;
        if rest.is_empty() {
            Some(ty)
        } else {
            None
        }
    }

    fn parse_inner(input: &str, depth: usize) -> Option<(Self, &str)> {
        if depth > MAX_TYPE_DEPTH {
            return None;
        }
        let end = input.find(['<', '>', ',']).unwrap_or(input.len());
        let tag = &input[..end];
        if tag.is_empty() {
            return None;
        }
        let mut rest = &input[end..];
        let mut params = Vec::new();
        if let Some(stripped) = rest.strip_prefix('<') {
            rest = stripped;
            loop {
                let (param, after) = Self::parse_inner(rest, depth + 1)?;
                params.push(param);
                if let Some(next) = after.strip_prefix(',') {
                    rest = next;
                } else if let Some(next) = after.strip_prefix('>') {
                    rest = next;
                    break;
                } else {
                    return None;
                }
            }
        }
        Some((Self::with_params(tag.to_ascii_lowercase(), params), rest))
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)?;
        if !self.params.is_empty() {
            let inner: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
            write!(f, "<{}>", inner.join(", "))?;
        }
        Ok(())
    }
}

/// 规范化类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanonicalType {
    Int8,
    Int16,
    Int32,
    Int64,
    /// 任意精度整数
    VarInt,
    /// 任意精度小数
    Decimal,
    Float32,
    Float64,
    Text,
    Boolean,
    Timestamp,
    Date,
    Time,
    Duration,
    Uuid,
    Inet,
    Blob,
    /// 无固定结构的嵌套文档（JSON 对象）
    Document,
    List(Box<CanonicalType>),
    Set(Box<CanonicalType>),
    Map(Box<CanonicalType>, Box<CanonicalType>),
    Tuple(Vec<CanonicalType>),
    /// 用户自定义类型 / 结构体
    Struct(String),
    Null,
    Unknown,
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalType::Int8 => write!(f, "int8"),
            CanonicalType::Int16 => write!(f, "int16"),
            CanonicalType::Int32 => write!(f, "int32"),
            CanonicalType::Int64 => write!(f, "int64"),
            CanonicalType::VarInt => write!(f, "varint"),
            CanonicalType::Decimal => write!(f, "decimal"),
            CanonicalType::Float32 => write!(f, "float32"),
            CanonicalType::Float64 => write!(f, "float64"),
            CanonicalType::Text => write!(f, "text"),
            CanonicalType::Boolean => write!(f, "boolean"),
            CanonicalType::Timestamp => write!(f, "timestamp"),
            CanonicalType::Date => write!(f, "date"),
            CanonicalType::Time => write!(f, "time"),
            CanonicalType::Duration => write!(f, "duration"),
            CanonicalType::Uuid => write!(f, "uuid"),
            CanonicalType::Inet => write!(f, "inet"),
            CanonicalType::Blob => write!(f, "blob"),
            CanonicalType::Document => write!(f, "document"),
            CanonicalType::List(t) => write!(f, "list<{}>", t),
            CanonicalType::Set(t) => write!(f, "set<{}>", t),
            CanonicalType::Map(k, v) => write!(f, "map<{}, {}>", k, v),
            CanonicalType::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(|t| t.to_string()).collect();
                write!(f, "tuple<{}>", inner.join(", "))
            }
            CanonicalType::Struct(name) => write!(f, "struct<{}>", name),
            CanonicalType::Null => write!(f, "null"),
            CanonicalType::Unknown => write!(f, "unknown"),
        }
    }
}

/// 把原生类型树规范化
///
/// 集合标签（list/set/map/tuple/frozen/vector）在这里按结构递归处理，
/// 叶子标签交给 `leaf` 映射；两者都不认识时返回 `Unknown`。
pub fn normalize_type<F>(native: &NativeType, leaf: &F) -> CanonicalType
where
    F: Fn(&str) -> Option<CanonicalType> + ?Sized,
{
    let param = |i: usize| {
        native
            .params
            .get(i)
            .map(|p| normalize_type(p, leaf))
            .unwrap_or(CanonicalType::Unknown)
    };

    match (native.tag.as_str(), native.params.len()) {
        ("list", 1) | ("vector", 1..=2) => CanonicalType::List(Box::new(param(0))),
        ("set", 1) => CanonicalType::Set(Box::new(param(0))),
        ("map", 2) => CanonicalType::Map(Box::new(param(0)), Box::new(param(1))),
        ("tuple", n) if n > 0 => CanonicalType::Tuple(
            native
                .params
                .iter()
                .map(|p| normalize_type(p, leaf))
                .collect(),
        ),
        // frozen<T> 只影响存储语义
        ("frozen", 1) => param(0),
        (tag, 0) => leaf(tag).unwrap_or(CanonicalType::Unknown),
        _ => CanonicalType::Unknown,
    }
}
