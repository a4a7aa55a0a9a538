//! 会话回收策略

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::session_manager::SessionSlot;
use crate::config::SessionConfig;

/// 决定一个会话是否应被回收
pub trait EvictionPolicy: Send + Sync + fmt::Debug {
    fn should_evict(&self, slot: &SessionSlot, now: Instant) -> bool;
}

/// 空闲超时 + 可选的最长存活时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub idle_ttl: Duration,
    pub max_lifetime: Option<Duration>,
}

impl TtlPolicy {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            idle_ttl,
            max_lifetime: None,
        }
    }

    pub fn with_max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.max_lifetime = Some(max_lifetime);
        self
    }
}

impl EvictionPolicy for TtlPolicy {
    fn should_evict(&self, slot: &SessionSlot, now: Instant) -> bool {
        if now.saturating_duration_since(slot.last_used_instant()) > self.idle_ttl {
            return true;
        }
        matches!(self.max_lifetime, Some(max) if now.saturating_duration_since(slot.created_instant()) > max)
    }
}

/// 从不回收
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverEvict;

impl EvictionPolicy for NeverEvict {
    fn should_evict(&self, _slot: &SessionSlot, _now: Instant) -> bool {
        false
    }
}

/// 按配置构造策略；空闲超时为 0 且没有最长存活时间时不回收
pub fn policy_from_config(config: &SessionConfig) -> Arc<dyn EvictionPolicy> {
    match (config.idle_timeout_secs, config.max_lifetime_secs) {
        (0, None) => Arc::new(NeverEvict),
        (0, Some(max)) => Arc::new(
            TtlPolicy::new(Duration::MAX).with_max_lifetime(Duration::from_secs(max)),
        ),
        (idle, max) => {
            let policy = TtlPolicy::new(Duration::from_secs(idle));
            Arc::new(match max {
                Some(max) => policy.with_max_lifetime(Duration::from_secs(max)),
                None => policy,
            })
        }
    }
}
