//! 查询管道集成测试
//!
//! 测试范围:
//! - 基本查询、LIMIT、列描述
//! - 只读策略拒绝写语句，并记录失败的历史
//! - 任意输入都不会返回 Err
//! - 分页游标往返无重复、无遗漏
//! - 类型规范化稳定
//! - 聚合与索引（能力检查）

mod common;

use std::collections::HashSet;

use polystore::core::error::FailureKind;
use polystore::core::types::{AggregationRequest, PageState, QueryRequest};
use polystore::audit::QueryStatus;
use serde_json::json;

use common::assertions::{assert_count, assert_query_failed, assert_rows_match_columns};
use common::data_fixtures::ORDERS;
use common::TestRuntime;

#[tokio::test]
async fn test_select_with_limit() {
    let t = TestRuntime::new().await;
    let id = t.connect().await;

    let result = t
        .runtime
        .execute_query(&id, &QueryRequest::new("SELECT * FROM orders LIMIT 10"))
        .await
        .expect("会话有效");

    assert!(result.success);
    assert!(result.row_count <= 10);
    assert_eq!(result.row_count, result.rows.len());
    let first = result.rows.first().expect("至少一行");
    assert_eq!(result.columns.len(), first.len());
    assert_rows_match_columns(&result);
    assert!(result.page_state.is_none());
}

#[tokio::test]
async fn test_write_statements_are_rejected() {
    let t = TestRuntime::new().await;
    let id = t.connect().await;

    for text in [
        "DROP TABLE t",
        "insert into orders (_id) values (1)",
        "/* cleanup */ DELETE FROM orders",
        "-- sneaky\n  update orders set paid = true",
    ] {
        let result = t
            .runtime
            .execute_query(&id, &QueryRequest::new(text))
            .await
            .expect("会话有效");
        assert_query_failed(&result, FailureKind::OperationNotAllowed);
        assert!(result
            .error
            .as_deref()
            .is_some_and(|e| e.contains("Only SELECT queries are allowed")));
    }

    t.runtime.flush_audit().await;
    let history = t.audit.queries();
    assert_count(&history, 4, "查询历史");
    assert!(history.iter().all(|q| q.status == QueryStatus::Error));
    assert!(history.iter().all(|q| q.row_count == 0));
}

#[tokio::test]
async fn test_leading_comments_do_not_hide_select() {
    let t = TestRuntime::new().await;
    let id = t.connect().await;
    let result = t
        .runtime
        .execute_query(
            &id,
            &QueryRequest::new("// saved query\n/* v2 */ select _id from orders limit 1"),
        )
        .await
        .expect("会话有效");
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.row_count, 1);
}

#[tokio::test]
async fn test_execute_query_never_errors_on_bad_input() {
    let t = TestRuntime::new().await;
    let id = t.connect().await;

    let inputs = [
        "",
        "   ",
        "SELECT",
        "SELECT * FROM",
        "SELECT * FROM missing_table",
        "SELECT * FROM orders WHERE",
        "SELECT * FROM orders LIMIT -1",
        "SELECT ☃ FROM orders",
        "\u{0}\u{1}",
        "SELECT * FROM orders; DROP TABLE orders",
    ];
    for text in inputs {
        let result = t
            .runtime
            .execute_query(&id, &QueryRequest::new(text))
            .await
            .unwrap_or_else(|e| panic!("'{}' 不应返回 Err: {}", text, e));
        assert!(!result.success, "'{}' 应该失败", text);
        assert!(result.error.as_deref().is_some_and(|e| !e.is_empty()));
    }

    let garbage_cursor = QueryRequest::new("SELECT * FROM orders")
        .with_page_state(Some(PageState::new("not-a-cursor")));
    let result = t
        .runtime
        .execute_query(&id, &garbage_cursor)
        .await
        .expect("会话有效");
    assert!(!result.success);
}

#[tokio::test]
async fn test_pagination_round_trip_has_no_gaps() {
    let t = TestRuntime::new().await;
    let id = t.connect().await;

    let full = t
        .runtime
        .execute_query(&id, &QueryRequest::new("SELECT * FROM orders").with_page_size(1000))
        .await
        .expect("会话有效");
    assert_eq!(full.row_count, ORDERS);
    assert!(full.page_state.is_none());

    for page_size in [1u32, 4, 7, 25, 30] {
        let mut collected = Vec::new();
        let mut request = QueryRequest::new("SELECT * FROM orders").with_page_size(page_size);
        let mut pages = 0;
        loop {
            let page = t
                .runtime
                .execute_query(&id, &request)
                .await
                .expect("会话有效");
            assert!(page.success, "{:?}", page.error);
            assert!(page.row_count <= page_size as usize);
            collected.extend(page.rows);
            pages += 1;
            match page.page_state {
                Some(state) => request = request.with_page_state(Some(state)),
                None => break,
            }
        }
        assert_eq!(collected, full.rows, "page_size = {}", page_size);
        assert_eq!(pages, ORDERS.div_ceil(page_size as usize).max(1));

        let ids: HashSet<String> = collected.iter().map(|r| r["_id"].to_string()).collect();
        assert_eq!(ids.len(), ORDERS);
    }
}

#[tokio::test]
async fn test_page_size_is_clamped() {
    let t = TestRuntime::new().await;
    let id = t.connect().await;
    let result = t
        .runtime
        .execute_query(&id, &QueryRequest::new("SELECT * FROM orders").with_page_size(0))
        .await
        .expect("会话有效");
    assert!(result.success);
    assert_eq!(result.row_count, 1);
    assert!(result.has_more());
}

#[tokio::test]
async fn test_type_normalization_is_stable() {
    let t = TestRuntime::new().await;
    let id = t.connect().await;
    let request = QueryRequest::new("SELECT _id, total, paid, items, customer FROM orders");

    let mut seen = None;
    for _ in 0..3 {
        let result = t
            .runtime
            .execute_query(&id, &request)
            .await
            .expect("会话有效");
        let types: Vec<(String, String)> = result
            .columns
            .into_iter()
            .map(|c| (c.name, c.canonical_type))
            .collect();
        match &seen {
            None => seen = Some(types),
            Some(previous) => assert_eq!(previous, &types),
        }
    }

    let types = seen.expect("至少执行一次");
    let expected: Vec<(String, String)> = [
        ("_id", "int64"),
        ("total", "float64"),
        ("paid", "boolean"),
        ("items", "list<text>"),
        ("customer", "text"),
    ]
    .iter()
    .map(|(n, t)| (n.to_string(), t.to_string()))
    .collect();
    assert_eq!(types, expected);
}

#[tokio::test]
async fn test_bound_parameters() {
    let t = TestRuntime::new().await;
    let id = t.connect().await;
    let request = QueryRequest::new("SELECT _id FROM orders WHERE customer = ?")
        .with_parameters(vec![json!("c1")]);
    let result = t
        .runtime
        .execute_query(&id, &request)
        .await
        .expect("会话有效");
    assert!(result.success, "{:?}", result.error);
    assert!(result.rows.iter().all(|r| r["_id"].as_u64().is_some_and(|v| v % 3 == 1)));
    assert_eq!(result.row_count, (0..ORDERS).filter(|i| i % 3 == 1).count());
}

#[tokio::test]
async fn test_successful_queries_are_audited() {
    let t = TestRuntime::new().await;
    let id = t.connect().await;
    t.runtime
        .execute_query(&id, &QueryRequest::new("SELECT * FROM orders LIMIT 3"))
        .await
        .expect("会话有效");
    t.runtime.flush_audit().await;

    let history = t.audit.queries();
    assert_count(&history, 1, "查询历史");
    assert_eq!(history[0].status, QueryStatus::Success);
    assert_eq!(history[0].row_count, 3);
    assert_eq!(history[0].connection_id, id);
}

#[tokio::test]
async fn test_aggregation_on_capable_backend() {
    let t = TestRuntime::new().await;
    let id = t.connect().await;
    let request = AggregationRequest {
        database: None,
        collection: "orders".to_string(),
        pipeline: vec![
            json!({"$match": {"paid": true}}),
            json!({"$count": "paid_orders"}),
        ],
    };
    let result = t
        .runtime
        .execute_aggregation(&id, &request)
        .await
        .expect("聚合成功");
    assert!(result.success);
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0]["paid_orders"], json!(13));

    let bad = AggregationRequest {
        pipeline: vec![json!({"$lookup": {}})],
        ..request
    };
    let failed = t
        .runtime
        .execute_aggregation(&id, &bad)
        .await
        .expect("后端失败写在结果里");
    assert_query_failed(&failed, FailureKind::QuerySyntaxError);

    t.runtime.flush_audit().await;
    let history = t.audit.queries();
    assert_count(&history, 2, "聚合历史");
    assert_eq!(history[1].status, QueryStatus::Error);
}

#[tokio::test]
async fn test_list_indexes_skips_unparsable_targets() {
    let t = TestRuntime::new().await;
    let id = t.connect().await;
    let indexes = t
        .runtime
        .list_indexes(&id, "shop", "customers")
        .await
        .expect("索引列表");
    assert_count(&indexes, 1, "索引");
    assert_eq!(indexes[0].name, "customers_email_idx");
    assert_eq!(indexes[0].column, "email");
}
