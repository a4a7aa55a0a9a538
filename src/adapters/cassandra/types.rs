//! CQL 类型映射

use scylla::frame::response::result::ColumnType;

use crate::core::types::{CanonicalType, NativeType};

/// 驱动返回的列类型 -> 原生类型树
pub fn native_from_column_type(typ: &ColumnType) -> NativeType {
    match typ {
        ColumnType::Ascii => NativeType::leaf("ascii"),
        ColumnType::Boolean => NativeType::leaf("boolean"),
        ColumnType::Blob => NativeType::leaf("blob"),
        ColumnType::Counter => NativeType::leaf("counter"),
        ColumnType::Date => NativeType::leaf("date"),
        ColumnType::Decimal => NativeType::leaf("decimal"),
        ColumnType::Double => NativeType::leaf("double"),
        ColumnType::Duration => NativeType::leaf("duration"),
        ColumnType::Float => NativeType::leaf("float"),
        ColumnType::Int => NativeType::leaf("int"),
        ColumnType::BigInt => NativeType::leaf("bigint"),
        ColumnType::Text => NativeType::leaf("text"),
        ColumnType::Timestamp => NativeType::leaf("timestamp"),
        ColumnType::Inet => NativeType::leaf("inet"),
        ColumnType::SmallInt => NativeType::leaf("smallint"),
        ColumnType::TinyInt => NativeType::leaf("tinyint"),
        ColumnType::Time => NativeType::leaf("time"),
        ColumnType::Timeuuid => NativeType::leaf("timeuuid"),
        ColumnType::Uuid => NativeType::leaf("uuid"),
        ColumnType::Varint => NativeType::leaf("varint"),
        ColumnType::List(inner) => {
            NativeType::with_params("list", vec![native_from_column_type(inner)])
        }
        ColumnType::Set(inner) => NativeType::with_params("set", vec![native_from_column_type(inner)]),
        ColumnType::Map(key, value) => NativeType::with_params(
            "map",
            vec![native_from_column_type(key), native_from_column_type(value)],
        ),
        ColumnType::Tuple(items) => NativeType::with_params(
            "tuple",
            items.iter().map(native_from_column_type).collect(),
        ),
        ColumnType::UserDefinedType { type_name, .. } => NativeType::leaf(type_name.to_string()),
        ColumnType::Custom(class) => NativeType::leaf(format!("'{}'", class)),
        #[allow(unreachable_patterns)]
        _ => NativeType::leaf("custom"),
    }
}

/// CQL 叶子类型 -> 规范化类型
///
/// 非内置的裸标识符视为用户自定义类型；带引号或包含点号的自定义类视为未知。
pub fn cql_leaf_type(tag: &str) -> Option<CanonicalType> {
    let canonical = match tag {
        "ascii" | "text" | "varchar" => CanonicalType::Text,
        "boolean" => CanonicalType::Boolean,
        "tinyint" => CanonicalType::Int8,
        "smallint" => CanonicalType::Int16,
        "int" => CanonicalType::Int32,
        "bigint" | "counter" => CanonicalType::Int64,
        "varint" => CanonicalType::VarInt,
        "decimal" => CanonicalType::Decimal,
        "float" => CanonicalType::Float32,
        "double" => CanonicalType::Float64,
        "timestamp" => CanonicalType::Timestamp,
        "date" => CanonicalType::Date,
        "time" => CanonicalType::Time,
        "duration" => CanonicalType::Duration,
        "uuid" | "timeuuid" => CanonicalType::Uuid,
        "inet" => CanonicalType::Inet,
        "blob" => CanonicalType::Blob,
        udt if is_identifier(udt) => CanonicalType::Struct(udt.to_string()),
        _ => return None,
    };
    Some(canonical)
}

fn is_identifier(tag: &str) -> bool {
    let mut chars = tag.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
