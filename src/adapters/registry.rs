//! 适配器注册表
//!
//! 每种后端类型恰好保存一个适配器实例，负责把类型标记解析为实现并提供发现信息。
//! 注册表由进程入口显式构造并注入运行时，不保存任何连接状态。

use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::adapters::DatabaseAdapter;
use crate::config::Config;
use crate::core::error::{RuntimeError, RuntimeResult};
use crate::core::types::{AdapterDescriptor, BackendType};

/// 适配器注册表
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<BackendType, Arc<dyn DatabaseAdapter>>,
}

impl AdapterRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册内置的全部适配器
    pub fn with_defaults() -> Self {
        Self::from_config(&Config::default())
    }

    /// 注册内置适配器，驱动参数取自配置文件
    #[cfg_attr(not(feature = "cassandra"), allow(unused_variables))]
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "cassandra")]
        {
            use crate::adapters::cassandra::CassandraAdapter;
            registry.register(Arc::new(
                CassandraAdapter::cassandra().with_settings(config.cassandra.clone()),
            ));
            registry.register(Arc::new(
                CassandraAdapter::scylla().with_settings(config.cassandra.clone()),
            ));
        }
        registry.register(Arc::new(crate::adapters::memory::MemoryAdapter::new()));
        registry
    }

    /// 注册适配器
    ///
    /// 同类型重复注册时覆盖旧实例（后写者胜出），并返回被替换的实例。
    pub fn register(&mut self, adapter: Arc<dyn DatabaseAdapter>) -> Option<Arc<dyn DatabaseAdapter>> {
        let backend_type = adapter.backend_type();
        let display_name = adapter.descriptor().display_name.clone();
        let previous = self.adapters.insert(backend_type, adapter);
        if previous.is_some() {
            warn!(
                "Adapter for {} is already registered. Overwriting.",
                backend_type
            );
        }
        info!("Registered adapter: {} ({})", display_name, backend_type);
        previous
    }

    /// 按后端类型获取适配器
    pub fn get(&self, backend_type: BackendType) -> RuntimeResult<Arc<dyn DatabaseAdapter>> {
        self.adapters
            .get(&backend_type)
            .cloned()
            .ok_or_else(|| self.not_found(backend_type.as_str()))
    }

    /// 按类型标记（字符串）获取适配器
    pub fn get_by_name(&self, token: &str) -> RuntimeResult<Arc<dyn DatabaseAdapter>> {
        let backend_type = token
            .parse::<BackendType>()
            .map_err(|unknown| self.not_found(&unknown))?;
        self.get(backend_type)
    }

    pub fn has(&self, backend_type: BackendType) -> bool {
        self.adapters.contains_key(&backend_type)
    }

    /// 已注册的后端类型（有序）
    pub fn available_types(&self) -> Vec<BackendType> {
        self.adapters.keys().copied().collect()
    }

    pub fn list(&self) -> Vec<Arc<dyn DatabaseAdapter>> {
        self.adapters.values().cloned().collect()
    }

    /// 发现接口：只暴露描述信息，不暴露任何会话状态
    pub fn describe_all(&self) -> Vec<AdapterDescriptor> {
        self.adapters
            .values()
            .map(|adapter| adapter.descriptor().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    fn not_found(&self, requested: &str) -> RuntimeError {
        RuntimeError::AdapterNotFound {
            requested: requested.to_string(),
            available: self
                .adapters
                .keys()
                .map(|t| t.as_str().to_string())
                .collect(),
        }
    }
}
