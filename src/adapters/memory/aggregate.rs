//! 聚合管道
//!
//! 支持的阶段：`$match`（字段相等）、`$sort`、`$skip`、`$limit`、`$project`、`$count`。

use serde_json::Value;
use std::cmp::Ordering;

use super::dialect::values_equal;
use crate::core::error::{BackendError, FailureKind};
use crate::core::types::Row;

fn stage_error(message: impl Into<String>) -> BackendError {
    BackendError::classified(FailureKind::QuerySyntaxError, message)
}

/// 在文档集合上依次执行各阶段
pub fn run_pipeline(documents: &[Row], pipeline: &[Value]) -> Result<Vec<Row>, BackendError> {
    let mut current: Vec<Row> = documents.to_vec();

    for (idx, stage) in pipeline.iter().enumerate() {
        let obj = stage
            .as_object()
            .filter(|o| o.len() == 1)
            .ok_or_else(|| stage_error(format!("stage {} must be an object with one operator", idx)))?;
        let (op, arg) = obj
            .iter()
            .next()
            .ok_or_else(|| stage_error(format!("stage {} is empty", idx)))?;

        current = match op.as_str() {
            "$match" => {
                let conditions = arg
                    .as_object()
                    .ok_or_else(|| stage_error("$match expects an object"))?;
                current
                    .into_iter()
                    .filter(|doc| {
                        conditions.iter().all(|(field, expected)| {
                            values_equal(doc.get(field).unwrap_or(&Value::Null), expected)
                        })
                    })
                    .collect()
            }
            "$sort" => {
                let keys = arg
                    .as_object()
                    .ok_or_else(|| stage_error("$sort expects an object"))?;
                let mut sorted = current;
                sorted.sort_by(|a, b| {
                    for (field, dir) in keys {
                        let ord = compare_values(a.get(field), b.get(field));
                        let ord = if dir.as_i64() == Some(-1) { ord.reverse() } else { ord };
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                    Ordering::Equal
                });
                sorted
            }
            "$skip" => {
                let n = arg
                    .as_u64()
                    .ok_or_else(|| stage_error("$skip expects a non-negative integer"))?;
                current.into_iter().skip(n as usize).collect()
            }
            "$limit" => {
                let n = arg
                    .as_u64()
                    .ok_or_else(|| stage_error("$limit expects a non-negative integer"))?;
                current.into_iter().take(n as usize).collect()
            }
            "$project" => {
                let fields = arg
                    .as_object()
                    .ok_or_else(|| stage_error("$project expects an object"))?;
                let keep: Vec<&String> = fields
                    .iter()
                    .filter(|(_, v)| v.as_i64() == Some(1) || v.as_bool() == Some(true))
                    .map(|(k, _)| k)
                    .collect();
                current
                    .into_iter()
                    .map(|doc| {
                        keep.iter()
                            .map(|k| ((*k).clone(), doc.get(*k).cloned().unwrap_or(Value::Null)))
                            .collect()
                    })
                    .collect()
            }
            "$count" => {
                let name = arg
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| stage_error("$count expects a field name"))?;
                let mut row = Row::new();
                row.insert(name.to_string(), Value::from(current.len() as u64));
                vec![row]
            }
            other => return Err(stage_error(format!("unsupported pipeline stage {}", other))),
        };
    }

    Ok(current)
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// 跨类型比较：先按类型排序，同类型再比较值
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
