//! 连接配置与连接结果

use serde::{Deserialize, Serialize};
use std::fmt;

/// 连接配置
///
/// 各后端所需字段的并集，每个适配器只解释自己需要的字段并负责校验组合。
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// 连接串方式（例如 `cassandra://host:9042/keyspace`）
    pub uri: Option<String>,

    pub username: Option<String>,
    pub password: Option<String>,
    /// AWS
    pub access_key: Option<String>,
    /// AWS
    pub secret_key: Option<String>,

    /// Cassandra
    pub keyspace: Option<String>,
    pub database: Option<String>,
    /// AWS DynamoDB
    pub region: Option<String>,
    /// Cassandra
    pub local_data_center: Option<String>,
}

impl ConnectionConfig {
    pub fn host_port(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// 用户名和密码同时存在时返回二者
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(u), Some(p)) if !u.is_empty() => Some((u, p)),
            _ => None,
        }
    }

    /// 审计日志中记录的连接摘要，不含任何凭据
    pub fn audit_details(&self) -> serde_json::Value {
        serde_json::json!({
            "host": self.host,
            "port": self.port,
            "keyspace": self.keyspace,
            "database": self.database,
        })
    }
}

// 手写 Debug，避免把密码写进日志
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("uri", &self.uri)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("access_key", &self.access_key)
            .field("secret_key", &redact(&self.secret_key))
            .field("keyspace", &self.keyspace)
            .field("database", &self.database)
            .field("region", &self.region)
            .field("local_data_center", &self.local_data_center)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Failed,
}

/// connect() 的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResult {
    pub connection_id: String,
    pub status: ConnectionStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Success,
    Failed,
}

/// test_connection() 的结果，总是返回而不是报错
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub success: bool,
    pub status: TestStatus,
    pub message: String,
    pub execution_time_ms: u64,
}

impl TestResult {
    pub fn ok(message: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            status: TestStatus::Success,
            message: message.into(),
            execution_time_ms,
        }
    }

    pub fn failed(message: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            status: TestStatus::Failed,
            message: message.into(),
            execution_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let config = ConnectionConfig::host_port("localhost", 9042).with_credentials("admin", "hunter2");
        let printed = format!("{:?}", config);
        assert!(printed.contains("admin"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_deserialize_partial_camel_case() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{"host":"10.0.0.1","port":9042,"localDataCenter":"dc1"}"#)
                .expect("parse config");
        assert_eq!(config.host.as_deref(), Some("10.0.0.1"));
        assert_eq!(config.local_data_center.as_deref(), Some("dc1"));
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_audit_details_excludes_credentials() {
        let config = ConnectionConfig::host_port("localhost", 9042).with_credentials("admin", "hunter2");
        let details = config.audit_details().to_string();
        assert!(!details.contains("hunter2"));
        assert!(!details.contains("admin"));
    }
}
