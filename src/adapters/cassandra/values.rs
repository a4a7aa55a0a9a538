//! CQL 值与 JSON 之间的转换

use scylla::frame::response::result::{ColumnType, CqlValue};
use scylla::frame::value::{
    Counter, CqlDate, CqlDecimal, CqlTime, CqlTimestamp, CqlTimeuuid, CqlVarint,
};
use chrono::Timelike;
use serde_json::{Map, Number, Value};
use thiserror::Error;

use super::types::native_from_column_type;
use crate::core::error::{BackendError, FailureKind};

/// 驱动返回的单元格 -> JSON
pub fn cql_to_json(value: Option<&CqlValue>) -> Value {
    let Some(value) = value else {
        return Value::Null;
    };
    match value {
        CqlValue::Ascii(s) | CqlValue::Text(s) => Value::String(s.clone()),
        CqlValue::Boolean(b) => Value::Bool(*b),
        CqlValue::TinyInt(n) => Value::from(*n),
        CqlValue::SmallInt(n) => Value::from(*n),
        CqlValue::Int(n) => Value::from(*n),
        CqlValue::BigInt(n) => Value::from(*n),
        CqlValue::Counter(c) => Value::from(c.0),
        CqlValue::Float(f) => float_to_json(f64::from(*f)),
        CqlValue::Double(f) => float_to_json(*f),
        CqlValue::Blob(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        CqlValue::Inet(addr) => Value::String(addr.to_string()),
        CqlValue::Uuid(id) => Value::String(id.to_string()),
        CqlValue::Timestamp(ts) => chrono::DateTime::from_timestamp_millis(ts.0)
            .map(|dt| Value::String(dt.to_rfc3339()))
            .unwrap_or_else(|| Value::from(ts.0)),
        CqlValue::List(items) | CqlValue::Set(items) => {
            Value::Array(items.iter().map(|v| cql_to_json(Some(v))).collect())
        }
        CqlValue::Map(entries) => {
            let mut map = Map::new();
            for (k, v) in entries {
                let key = match cql_to_json(Some(k)) {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                map.insert(key, cql_to_json(Some(v)));
            }
            Value::Object(map)
        }
        CqlValue::Tuple(items) => {
            Value::Array(items.iter().map(|v| cql_to_json(v.as_ref())).collect())
        }
        CqlValue::UserDefinedType { fields, .. } => Value::Object(
            fields
                .iter()
                .map(|(name, v)| (name.clone(), cql_to_json(v.as_ref())))
                .collect(),
        ),
        CqlValue::Empty => Value::Null,
        // varint/decimal/date/time/duration/timeuuid 的驱动类型没有稳定的 JSON 形式
        other => Value::String(format!("{:?}", other)),
    }
}

fn float_to_json(f: f64) -> Value {
    Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(f.to_string()))
}

/// 参数绑定失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("语句需要 {expected} 个绑定参数，实际提供 {actual} 个")]
    Arity { expected: usize, actual: usize },
    #[error("参数 {index}: {value} 超出 {column_type} 的取值范围")]
    OutOfRange {
        index: usize,
        value: String,
        column_type: String,
    },
    #[error("参数 {index}: 无法把 {value} 绑定为 {column_type}")]
    Mismatch {
        index: usize,
        value: String,
        column_type: String,
    },
    #[error("参数 {index}: 集合元素不能为 null")]
    NullElement { index: usize },
    #[error("参数 {index}: 不支持绑定 {column_type} 类型")]
    Unsupported { index: usize, column_type: String },
}

impl From<BindError> for BackendError {
    fn from(err: BindError) -> Self {
        BackendError::classified(FailureKind::QuerySyntaxError, err.to_string())
    }
}

/// 按预编译语句声明的参数类型绑定 JSON 参数
///
/// `types` 来自 `PreparedStatement::get_variable_col_specs`，与参数一一对应。
pub fn bind_parameters(
    parameters: &[Value],
    types: &[&ColumnType],
) -> Result<Vec<Option<CqlValue>>, BindError> {
    if parameters.len() != types.len() {
        return Err(BindError::Arity {
            expected: types.len(),
            actual: parameters.len(),
        });
    }
    parameters
        .iter()
        .zip(types)
        .enumerate()
        .map(|(index, (value, typ))| Binder { index }.value(value, typ))
        .collect()
}

struct Binder {
    index: usize,
}

impl Binder {
    fn value(&self, value: &Value, typ: &ColumnType) -> Result<Option<CqlValue>, BindError> {
        if value.is_null() {
            return Ok(None);
        }
        self.non_null(value, typ).map(Some)
    }

    /// 集合元素不允许为 null
    fn element(&self, value: &Value, typ: &ColumnType) -> Result<CqlValue, BindError> {
        if value.is_null() {
            return Err(BindError::NullElement { index: self.index });
        }
        self.non_null(value, typ)
    }

    fn non_null(&self, value: &Value, typ: &ColumnType) -> Result<CqlValue, BindError> {
        let bound = match (typ, value) {
            (ColumnType::Ascii, Value::String(s)) => CqlValue::Ascii(s.clone()),
            (ColumnType::Text, Value::String(s)) => CqlValue::Text(s.clone()),
            (ColumnType::Boolean, Value::Bool(b)) => CqlValue::Boolean(*b),
            (ColumnType::TinyInt, Value::Number(_)) => {
                CqlValue::TinyInt(self.narrow(self.integer(value, typ)?, value, typ)?)
            }
            (ColumnType::SmallInt, Value::Number(_)) => {
                CqlValue::SmallInt(self.narrow(self.integer(value, typ)?, value, typ)?)
            }
            (ColumnType::Int, Value::Number(_)) => {
                CqlValue::Int(self.narrow(self.integer(value, typ)?, value, typ)?)
            }
            (ColumnType::BigInt, Value::Number(_)) => CqlValue::BigInt(self.integer(value, typ)?),
            (ColumnType::Counter, Value::Number(_)) => {
                CqlValue::Counter(Counter(self.integer(value, typ)?))
            }
            (ColumnType::Varint, Value::Number(n)) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => CqlValue::Varint(CqlVarint::from_signed_bytes_be(varint_bytes(
                    i128::from(i),
                ))),
                (None, Some(u)) => CqlValue::Varint(CqlVarint::from_signed_bytes_be(varint_bytes(
                    i128::from(u),
                ))),
                _ => return Err(self.mismatch(value, typ)),
            },
            (ColumnType::Float, Value::Number(n)) => {
                let f = n.as_f64().ok_or_else(|| self.mismatch(value, typ))?;
                if f.is_finite() && f.abs() > f64::from(f32::MAX) {
                    return Err(self.out_of_range(value, typ));
                }
                CqlValue::Float(f as f32)
            }
            (ColumnType::Double, Value::Number(n)) => {
                CqlValue::Double(n.as_f64().ok_or_else(|| self.mismatch(value, typ))?)
            }
            (ColumnType::Decimal, Value::Number(n)) if n.is_i64() || n.is_u64() => {
                self.decimal(&n.to_string(), value, typ)?
            }
            (ColumnType::Decimal, Value::String(s)) => self.decimal(s, value, typ)?,
            (ColumnType::Timestamp, Value::Number(_)) => {
                CqlValue::Timestamp(CqlTimestamp(self.integer(value, typ)?))
            }
            (ColumnType::Timestamp, Value::String(s)) => chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| CqlValue::Timestamp(CqlTimestamp(dt.timestamp_millis())))
                .map_err(|_| self.mismatch(value, typ))?,
            (ColumnType::Date, Value::String(s)) => {
                let date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|_| self.mismatch(value, typ))?;
                let days = date
                    .signed_duration_since(chrono::NaiveDate::default())
                    .num_days();
                // CQL date: 以 2^31 为纪元的无符号天数
                let raw = u32::try_from(days + (1i64 << 31))
                    .map_err(|_| self.out_of_range(value, typ))?;
                CqlValue::Date(CqlDate(raw))
            }
            (ColumnType::Time, Value::String(s)) => {
                let time = chrono::NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                    .or_else(|_| chrono::NaiveTime::parse_from_str(s, "%H:%M:%S"))
                    .map_err(|_| self.mismatch(value, typ))?;
                let nanos = i64::from(time.num_seconds_from_midnight()) * 1_000_000_000
                    + i64::from(time.nanosecond());
                CqlValue::Time(CqlTime(nanos))
            }
            (ColumnType::Uuid, Value::String(s)) => {
                CqlValue::Uuid(s.parse().map_err(|_| self.mismatch(value, typ))?)
            }
            (ColumnType::Timeuuid, Value::String(s)) => {
                let id: uuid::Uuid = s.parse().map_err(|_| self.mismatch(value, typ))?;
                CqlValue::Timeuuid(CqlTimeuuid::from(id))
            }
            (ColumnType::Inet, Value::String(s)) => {
                CqlValue::Inet(s.parse().map_err(|_| self.mismatch(value, typ))?)
            }
            (ColumnType::Blob, Value::String(s)) => {
                let digits = s.strip_prefix("0x").unwrap_or(s);
                CqlValue::Blob(hex::decode(digits).map_err(|_| self.mismatch(value, typ))?)
            }
            (ColumnType::List(inner), Value::Array(items)) => CqlValue::List(self.elements(items, inner)?),
            (ColumnType::Set(inner), Value::Array(items)) => CqlValue::Set(self.elements(items, inner)?),
            (ColumnType::Map(key, val), Value::Object(entries)) => CqlValue::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((self.map_key(k, key)?, self.element(v, val)?)))
                    .collect::<Result<_, BindError>>()?,
            ),
            (ColumnType::Tuple(types), Value::Array(items)) => {
                if items.len() > types.len() {
                    return Err(self.mismatch(value, typ));
                }
                // 缺省的尾部分量按 null 绑定
                CqlValue::Tuple(
                    types
                        .iter()
                        .enumerate()
                        .map(|(i, t)| match items.get(i) {
                            Some(item) => self.value(item, t),
                            None => Ok(None),
                        })
                        .collect::<Result<_, BindError>>()?,
                )
            }
            (
                ColumnType::UserDefinedType {
                    type_name,
                    keyspace,
                    field_types,
                },
                Value::Object(fields),
            ) => {
                if let Some(unknown) = fields.keys().find(|k| !field_types.iter().any(|(f, _)| f == *k)) {
                    return Err(self.mismatch(&Value::String(unknown.clone()), typ));
                }
                CqlValue::UserDefinedType {
                    keyspace: keyspace.clone(),
                    type_name: type_name.clone(),
                    fields: field_types
                        .iter()
                        .map(|(name, t)| {
                            let bound = match fields.get(name) {
                                Some(v) => self.value(v, t)?,
                                None => None,
                            };
                            Ok((name.clone(), bound))
                        })
                        .collect::<Result<_, BindError>>()?,
                }
            }
            (ColumnType::Duration | ColumnType::Custom(_), _) => {
                return Err(BindError::Unsupported {
                    index: self.index,
                    column_type: type_name(typ),
                })
            }
            _ => return Err(self.mismatch(value, typ)),
        };
        Ok(bound)
    }

    fn elements(&self, items: &[Value], typ: &ColumnType) -> Result<Vec<CqlValue>, BindError> {
        items.iter().map(|item| self.element(item, typ)).collect()
    }

    /// JSON 对象的键总是字符串；非文本键按 JSON 字面量重新解析
    fn map_key(&self, key: &str, typ: &ColumnType) -> Result<CqlValue, BindError> {
        let literal = match typ {
            ColumnType::Ascii
            | ColumnType::Text
            | ColumnType::Uuid
            | ColumnType::Timeuuid
            | ColumnType::Inet
            | ColumnType::Date
            | ColumnType::Time
            | ColumnType::Blob => Value::String(key.to_string()),
            _ => serde_json::from_str(key).unwrap_or_else(|_| Value::String(key.to_string())),
        };
        self.element(&literal, typ)
    }

    fn integer(&self, value: &Value, typ: &ColumnType) -> Result<i64, BindError> {
        match value {
            Value::Number(n) if n.is_i64() => n.as_i64().ok_or_else(|| self.mismatch(value, typ)),
            Value::Number(n) if n.is_u64() => Err(self.out_of_range(value, typ)),
            _ => Err(self.mismatch(value, typ)),
        }
    }

    fn narrow<T: TryFrom<i64>>(&self, n: i64, value: &Value, typ: &ColumnType) -> Result<T, BindError> {
        T::try_from(n).map_err(|_| self.out_of_range(value, typ))
    }

    fn decimal(&self, text: &str, value: &Value, typ: &ColumnType) -> Result<CqlValue, BindError> {
        let (int_part, frac_part) = text.split_once('.').unwrap_or((text, ""));
        let scale = i32::try_from(frac_part.len()).map_err(|_| self.out_of_range(value, typ))?;
        let digits = format!("{}{}", int_part, frac_part);
        if frac_part.chars().any(|c| !c.is_ascii_digit()) {
            return Err(self.mismatch(value, typ));
        }
        let unscaled: i128 = digits.parse().map_err(|e: std::num::ParseIntError| {
            match e.kind() {
                std::num::IntErrorKind::PosOverflow | std::num::IntErrorKind::NegOverflow => {
                    self.out_of_range(value, typ)
                }
                _ => self.mismatch(value, typ),
            }
        })?;
        Ok(CqlValue::Decimal(CqlDecimal::from_signed_be_bytes_and_exponent(
            varint_bytes(unscaled),
            scale,
        )))
    }

    fn mismatch(&self, value: &Value, typ: &ColumnType) -> BindError {
        BindError::Mismatch {
            index: self.index,
            value: value.to_string(),
            column_type: type_name(typ),
        }
    }

    fn out_of_range(&self, value: &Value, typ: &ColumnType) -> BindError {
        BindError::OutOfRange {
            index: self.index,
            value: value.to_string(),
            column_type: type_name(typ),
        }
    }
}

fn type_name(typ: &ColumnType) -> String {
    native_from_column_type(typ).to_string()
}

/// 最短的大端二进制补码
fn varint_bytes(n: i128) -> Vec<u8> {
    let bytes = n.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// 取出文本单元格
pub fn text_at(columns: &[Option<CqlValue>], idx: usize) -> Option<String> {
    columns
        .get(idx)
        .and_then(|c| c.as_ref())
        .and_then(|c| c.as_text())
        .cloned()
}
