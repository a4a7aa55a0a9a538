//! 自定义断言辅助模块

use polystore::core::error::FailureKind;
use polystore::core::types::QueryResult;

/// 断言结果失败并匹配错误消息
pub fn assert_err_with<T: std::fmt::Debug, E: std::fmt::Display>(result: Result<T, E>, expected_msg: &str) {
    let err = result.expect_err("操作应该失败");
    let err_str = err.to_string();
    assert!(
        err_str.contains(expected_msg),
        "错误消息应包含 '{}', 实际是 '{}'",
        expected_msg,
        err_str
    );
}

/// 断言集合包含指定数量的元素
pub fn assert_count<T>(collection: &[T], expected: usize, item_name: &str) {
    assert_eq!(
        collection.len(),
        expected,
        "{}数量不匹配: 期望 {}, 实际 {}",
        item_name,
        expected,
        collection.len()
    );
}

/// 断言查询以指定分类失败，且错误文本带分类前缀
pub fn assert_query_failed(result: &QueryResult, kind: FailureKind) {
    assert!(!result.success, "查询应该失败: {:?}", result);
    assert!(result.rows.is_empty());
    assert_eq!(result.row_count, 0);
    assert_eq!(result.error_kind, Some(kind));
    let error = result.error.as_deref().unwrap_or_default();
    assert!(
        error.starts_with(&format!("{}: ", kind.as_str())),
        "错误文本应以 '{}: ' 开头, 实际是 '{}'",
        kind.as_str(),
        error
    );
}

/// 断言每一行的字段数与列描述一致
pub fn assert_rows_match_columns(result: &QueryResult) {
    for row in &result.rows {
        assert_eq!(row.len(), result.columns.len(), "行结构与列描述不一致: {:?}", row);
    }
}
