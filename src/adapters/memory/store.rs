//! 进程内文档存储
//!
//! 数据库 -> 集合 -> 文档（JSON 对象）。文档按插入顺序保存，分页按偏移量进行。

use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::core::types::{NativeType, Row};

/// 单个集合
#[derive(Debug, Clone, Default)]
pub struct MemoryCollection {
    pub documents: Vec<Row>,
    /// 索引名 -> 字段名
    pub indexes: BTreeMap<String, String>,
    /// 元数据查询注入的故障（用于验证部分失败容忍）
    pub metadata_fault: Option<String>,
}

impl MemoryCollection {
    /// 按首次出现顺序收集所有字段名
    pub fn field_names<'a>(documents: impl IntoIterator<Item = &'a Row>) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for doc in documents {
            for key in doc.keys() {
                if !names.iter().any(|n| n == key) {
                    names.push(key.clone());
                }
            }
        }
        names
    }

    /// 推断字段的原生类型：所有非空值类型一致时取该类型，否则为 `mixed`
    pub fn infer_field_type<'a>(documents: impl IntoIterator<Item = &'a Row>, field: &str) -> NativeType {
        infer_values(documents.into_iter().filter_map(|doc| doc.get(field)))
    }
}

fn infer_values<'a>(values: impl Iterator<Item = &'a serde_json::Value>) -> NativeType {
    let mut inferred: Option<NativeType> = None;
    for value in values {
        if value.is_null() {
            continue;
        }
        let ty = value_type(value);
        match &inferred {
            None => inferred = Some(ty),
            Some(existing) if *existing == ty => {}
            Some(_) => return NativeType::leaf("mixed"),
        }
    }
    inferred.unwrap_or_else(|| NativeType::leaf("null"))
}

/// 单个 JSON 值的原生类型标签
pub fn value_type(value: &serde_json::Value) -> NativeType {
    use serde_json::Value;
    match value {
        Value::Null => NativeType::leaf("null"),
        Value::Bool(_) => NativeType::leaf("bool"),
        Value::Number(n) if n.is_i64() || n.is_u64() => NativeType::leaf("long"),
        Value::Number(_) => NativeType::leaf("double"),
        Value::String(_) => NativeType::leaf("string"),
        Value::Array(items) => NativeType::with_params("list", vec![infer_values(items.iter())]),
        Value::Object(_) => NativeType::leaf("object"),
    }
}

/// 线程安全的内存存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    databases: RwLock<BTreeMap<String, BTreeMap<String, MemoryCollection>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_database(&self, database: &str) {
        self.databases
            .write()
            .entry(database.to_string())
            .or_default();
    }

    pub fn create_collection(&self, database: &str, collection: &str) {
        self.databases
            .write()
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();
    }

    /// 追加文档；非对象值会被包装为 `{"value": v}`
    pub fn insert_documents(
        &self,
        database: &str,
        collection: &str,
        documents: impl IntoIterator<Item = serde_json::Value>,
    ) -> usize {
        let mut guard = self.databases.write();
        let target = guard
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();
        let before = target.documents.len();
        for doc in documents {
            let row = match doc {
                serde_json::Value::Object(map) => map,
                other => {
                    let mut map = Row::new();
                    map.insert("value".to_string(), other);
                    map
                }
            };
            target.documents.push(row);
        }
        target.documents.len() - before
    }

    pub fn create_index(&self, database: &str, collection: &str, name: &str, field: &str) {
        self.databases
            .write()
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .indexes
            .insert(name.to_string(), field.to_string());
    }

    /// 让该集合的元数据查询失败
    pub fn inject_metadata_fault(&self, database: &str, collection: &str, message: &str) {
        if let Some(coll) = self
            .databases
            .write()
            .get_mut(database)
            .and_then(|db| db.get_mut(collection))
        {
            coll.metadata_fault = Some(message.to_string());
        }
    }

    pub fn has_database(&self, database: &str) -> bool {
        self.databases.read().contains_key(database)
    }

    pub fn database_names(&self) -> Vec<String> {
        self.databases.read().keys().cloned().collect()
    }

    pub fn collection_names(&self, database: &str) -> Option<Vec<String>> {
        self.databases
            .read()
            .get(database)
            .map(|db| db.keys().cloned().collect())
    }

    /// 在读锁下访问集合
    pub fn with_collection<R>(
        &self,
        database: &str,
        collection: &str,
        f: impl FnOnce(&MemoryCollection) -> R,
    ) -> Option<R> {
        let guard = self.databases.read();
        guard.get(database).and_then(|db| db.get(collection)).map(f)
    }
}
