//! 模式内省
//!
//! 每个集合的次级元数据查询相互独立并发执行；单个失败只让该项的计数缺失，
//! 不会让整个列表失败。

use futures::future::join_all;
use log::{debug, warn};

use crate::adapters::{BackendHandle, DatabaseAdapter};
use crate::core::error::AdapterResult;
use crate::core::types::{
    normalize_type, CanonicalType, ClusteringOrder, CollectionInfo, ColumnInfo, ColumnKind, DatabaseInfo,
    IndexInfo, NativeType, RawColumnDef, SchemaInfo,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaIntrospector;

impl SchemaIntrospector {
    pub fn new() -> Self {
        Self
    }

    /// 列出用户数据库（排除系统库），附带集合数量
    pub async fn list_databases(
        &self,
        adapter: &dyn DatabaseAdapter,
        handle: &BackendHandle,
    ) -> AdapterResult<Vec<DatabaseInfo>> {
        let system = adapter.system_databases();
        let mut names: Vec<String> = adapter
            .list_database_names(handle)
            .await?
            .into_iter()
            .filter(|name| !system.contains(&name.as_str()))
            .collect();
        names.sort();
        names.dedup();

        let counts = join_all(
            names
                .iter()
                .map(|db| adapter.list_collection_names(handle, db)),
        )
        .await;

        Ok(names
            .into_iter()
            .zip(counts)
            .map(|(name, count)| {
                let collections_count = match count {
                    Ok(collections) => Some(collections.len() as u64),
                    Err(e) => {
                        warn!("Could not get collection count for database {}: {}", name, e);
                        None
                    }
                };
                DatabaseInfo {
                    name,
                    collections_count,
                }
            })
            .collect())
    }

    /// 列出集合，附带基数提示
    pub async fn list_collections(
        &self,
        adapter: &dyn DatabaseAdapter,
        handle: &BackendHandle,
        database: &str,
    ) -> AdapterResult<Vec<CollectionInfo>> {
        let mut names = adapter.list_collection_names(handle, database).await?;
        names.sort();

        let cardinalities = join_all(
            names
                .iter()
                .map(|coll| adapter.collection_cardinality(handle, database, coll)),
        )
        .await;

        Ok(names
            .into_iter()
            .zip(cardinalities)
            .map(|(name, cardinality)| {
                let columns_count = match cardinality {
                    Ok(n) => Some(n),
                    Err(e) => {
                        warn!(
                            "Could not get column count for table {}.{}: {}",
                            database, name, e
                        );
                        None
                    }
                };
                CollectionInfo {
                    name,
                    kind: None,
                    columns_count,
                    documents_count: None,
                }
            })
            .collect())
    }

    /// 列定义与二级索引
    pub async fn get_schema(
        &self,
        adapter: &dyn DatabaseAdapter,
        handle: &BackendHandle,
        database: &str,
        collection: &str,
    ) -> AdapterResult<SchemaInfo> {
        let raw = adapter
            .describe_collection(handle, database, collection)
            .await?;

        let mut defs = raw.columns;
        defs.sort_by(|a, b| {
            column_rank(a.kind)
                .cmp(&column_rank(b.kind))
                .then_with(|| match a.kind {
                    ColumnKind::Regular | ColumnKind::Static => a.name.cmp(&b.name),
                    _ => a.position.cmp(&b.position),
                })
        });
        let leaf = |tag: &str| adapter.leaf_type(tag);
        let columns = defs
            .into_iter()
            .map(|def| column_info(def, &leaf))
            .collect();

        let indexes = raw
            .indexes
            .into_iter()
            .filter_map(|idx| match adapter.index_target(&idx.options) {
                Some(target) => Some(IndexInfo {
                    name: idx.name,
                    column: target.column,
                    kind: target.kind,
                }),
                None => {
                    debug!(
                        "Skipping index {} on {}.{}: unparsable target {:?}",
                        idx.name, database, collection, idx.options
                    );
                    None
                }
            })
            .collect();

        Ok(SchemaInfo { columns, indexes })
    }
}

fn column_rank(kind: ColumnKind) -> u8 {
    match kind {
        ColumnKind::PartitionKey => 0,
        ColumnKind::Clustering => 1,
        ColumnKind::Static => 2,
        ColumnKind::Regular => 3,
    }
}

fn column_info<F>(def: RawColumnDef, leaf: &F) -> ColumnInfo
where
    F: Fn(&str) -> Option<CanonicalType>,
{
    let canonical = NativeType::parse(&def.native_type)
        .map(|native| normalize_type(&native, leaf).to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let clustering_order = match def.kind {
        ColumnKind::Clustering => Some(
            def.clustering_order
                .as_deref()
                .map(ClusteringOrder::parse)
                .unwrap_or(ClusteringOrder::Asc),
        ),
        _ => None,
    };
    ColumnInfo {
        primary_key: def.kind.is_primary_key(),
        canonical_type: canonical,
        native_type: def.native_type,
        name: def.name,
        kind: def.kind,
        clustering_order,
    }
}
