//! 测试数据

use polystore::adapters::memory::MemoryStore;
use serde_json::json;

pub const DATABASE: &str = "shop";
pub const ORDERS: usize = 25;

/// 写入示例数据
///
/// - `shop.orders`: 25 条订单，`_id` 为 0..25
/// - `shop.customers`: 3 个客户，带 `email` 索引
/// - `shop.audit_trail`: 元数据查询会失败的集合
/// - `archive.orders_2019`: 另一个用户库
/// - `system.settings`: 内部库，不应出现在数据库列表中
pub fn seed(store: &MemoryStore) {
    store.insert_documents(
        DATABASE,
        "orders",
        (0..ORDERS).map(|i| {
            json!({
                "_id": i,
                "customer": format!("c{}", i % 3),
                "total": (i as f64) * 1.25,
                "paid": i % 2 == 0,
                "items": ["sku-1", "sku-2"],
            })
        }),
    );
    store.insert_documents(
        DATABASE,
        "customers",
        vec![
            json!({"_id": "c0", "name": "Ada", "email": "ada@example.com", "city": "London"}),
            json!({"_id": "c1", "name": "Grace", "email": "grace@example.com", "city": "Arlington"}),
            json!({"_id": "c2", "name": "Linus", "city": "Helsinki"}),
        ],
    );
    store.create_index(DATABASE, "customers", "customers_email_idx", "email");
    store.create_index(DATABASE, "customers", "customers_sasi_idx", "name,city");

    store.insert_documents(DATABASE, "audit_trail", vec![json!({"_id": 1, "event": "login"})]);
    store.inject_metadata_fault(DATABASE, "audit_trail", "Operation timed out while reading metadata");

    store.insert_documents("archive", "orders_2019", vec![json!({"_id": 1, "total": 10})]);
    store.insert_documents("system", "settings", vec![json!({"key": "version", "value": "1"})]);
}
