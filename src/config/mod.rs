use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::api::session::{DEFAULT_MAX_ALLOWED_CONNECTIONS, DEFAULT_SESSION_IDLE_TIMEOUT};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// 数据库驱动（scylla、sqlx）的日志级别
    pub driver_level: String,
    pub dir: String,
    pub file: String,
    pub max_file_size: u64,
    pub max_files: usize,
    /// 警告及以上同时输出到 stderr
    pub echo_warnings: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            driver_level: "warn".to_string(),
            dir: "logs".to_string(),
            file: "polystore".to_string(),
            max_file_size: 100 * 1024 * 1024, // 100MB
            max_files: 5,
            echo_warnings: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub max_sessions: usize,
    /// 空闲超时（秒），0 表示永不过期
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: Option<u64>,
    pub sweep_interval_secs: u64,
    /// 已销毁会话 id 的记忆容量
    pub tombstone_capacity: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_ALLOWED_CONNECTIONS,
            idle_timeout_secs: DEFAULT_SESSION_IDLE_TIMEOUT.as_secs(),
            max_lifetime_secs: None,
            sweep_interval_secs: 30,
            tombstone_capacity: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct QueryConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            max_page_size: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub queue_capacity: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// 设置后写入 SQLite，否则只保存在内存中
    pub sqlite_path: Option<String>,
    /// 内存历史最多保留的记录数，超出后丢弃最旧的
    pub memory_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 1024,
            max_retries: 3,
            retry_backoff_ms: 50,
            sqlite_path: Some("data/history.db".to_string()),
            memory_capacity: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CassandraConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub default_local_data_center: String,
}

impl Default for CassandraConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 10,
            default_local_data_center: "datacenter1".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub session: SessionConfig,
    pub query: QueryConfig,
    pub audit: AuditConfig,
    pub cassandra: CassandraConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<(), String> {
        if self.session.max_sessions == 0 {
            return Err("session.max_sessions 必须大于 0".to_string());
        }
        if self.query.default_page_size == 0 || self.query.max_page_size == 0 {
            return Err("query 分页大小必须大于 0".to_string());
        }
        if self.query.default_page_size > self.query.max_page_size {
            return Err(format!(
                "query.default_page_size ({}) 不能大于 max_page_size ({})",
                self.query.default_page_size, self.query.max_page_size
            ));
        }
        if self.audit.queue_capacity == 0 {
            return Err("audit.queue_capacity 必须大于 0".to_string());
        }
        if self.audit.memory_capacity == 0 {
            return Err("audit.memory_capacity 必须大于 0".to_string());
        }
        if self.cassandra.connect_timeout_secs == 0 {
            return Err("cassandra.connect_timeout_secs 必须大于 0".to_string());
        }
        Ok(())
    }
}
