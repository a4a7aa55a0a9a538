use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info, warn};
use moka::sync::Cache;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::eviction::{policy_from_config, EvictionPolicy};
use super::session_id::SessionIdIssuer;
use crate::adapters::BackendHandle;
use crate::config::SessionConfig;
use crate::core::error::{SessionError, SessionGone, SessionResult};
use crate::core::types::BackendType;

pub const DEFAULT_MAX_ALLOWED_CONNECTIONS: usize = 1000; // 默认最大会话数
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60); // 30分钟

/// 墓碑记录保留时长；过期后只能确定 ID 曾被签发，原因按 `Closed` 报告
const TOMBSTONE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// 一个活动会话
///
/// 句柄只在会话表内部流转，不会出现在 `SessionInfo` 里。
pub struct SessionSlot {
    id: String,
    backend_type: BackendType,
    handle: BackendHandle,
    created_at: DateTime<Utc>,
    created_instant: Instant,
    /// 相对 `created_instant` 的毫秒偏移
    last_used_offset_ms: AtomicU64,
}

impl SessionSlot {
    fn new(id: String, backend_type: BackendType, handle: BackendHandle) -> Self {
        Self {
            id,
            backend_type,
            handle,
            created_at: Utc::now(),
            created_instant: Instant::now(),
            last_used_offset_ms: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn backend_type(&self) -> BackendType {
        self.backend_type
    }

    pub fn handle(&self) -> &BackendHandle {
        &self.handle
    }

    pub fn created_instant(&self) -> Instant {
        self.created_instant
    }

    pub fn last_used_instant(&self) -> Instant {
        self.created_instant + Duration::from_millis(self.last_used_offset_ms.load(Ordering::Acquire))
    }

    /// 更新最后使用时间；只会向前移动
    pub fn touch(&self) {
        let offset = self.created_instant.elapsed().as_millis() as u64;
        self.last_used_offset_ms.fetch_max(offset, Ordering::AcqRel);
    }

    pub fn info(&self) -> SessionInfo {
        let offset = self.last_used_offset_ms.load(Ordering::Acquire);
        let last_used_at = self.created_at
            + chrono::Duration::milliseconds(i64::try_from(offset).unwrap_or(i64::MAX));
        SessionInfo {
            id: self.id.clone(),
            backend_type: self.backend_type,
            created_at: self.created_at,
            last_used_at,
            idle_secs: self.last_used_instant().elapsed().as_secs(),
        }
    }
}

impl fmt::Debug for SessionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSlot")
            .field("id", &self.id)
            .field("backend_type", &self.backend_type)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// 会话信息，用于展示会话列表
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub backend_type: BackendType,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub idle_secs: u64,
}

/// 会话表
///
/// 不同 id 之间不共享锁：DashMap 分片存储，最后使用时间是原子量。
pub struct SessionManager {
    sessions: DashMap<String, Arc<SessionSlot>>,
    ids: SessionIdIssuer,
    tombstones: Cache<String, SessionGone>,
    active: AtomicUsize,
    max_sessions: usize,
    policy: Arc<dyn EvictionPolicy>,
}

impl SessionManager {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            ids: SessionIdIssuer::new(),
            tombstones: Cache::builder()
                .max_capacity(config.tombstone_capacity)
                .time_to_live(TOMBSTONE_TTL)
                .build(),
            active: AtomicUsize::new(0),
            max_sessions: config.max_sessions,
            policy: policy_from_config(config),
        }
    }

    /// 替换回收策略
    pub fn with_policy(mut self, policy: Arc<dyn EvictionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// 登记新会话并签发 ID
    pub fn insert(
        &self,
        backend_type: BackendType,
        handle: BackendHandle,
    ) -> SessionResult<Arc<SessionSlot>> {
        let max = self.max_sessions;
        if self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .is_err()
        {
            warn!("Failed to create session: maximum sessions ({}) exceeded", max);
            return Err(SessionError::MaxSessionsExceeded(max));
        }

        let slot = loop {
            let id = self.ids.issue();
            if let Entry::Vacant(vacant) = self.sessions.entry(id.clone()) {
                let slot = Arc::new(SessionSlot::new(id, backend_type, handle));
                vacant.insert(Arc::clone(&slot));
                break slot;
            }
        };
        info!("Created session {} ({})", slot.id(), backend_type);
        Ok(slot)
    }

    /// 查找会话
    ///
    /// 不刷新最后使用时间：调用方在分发成功后再 `touch`。
    pub fn resolve(&self, id: &str) -> SessionResult<Arc<SessionSlot>> {
        match self.sessions.get(id) {
            Some(entry) => Ok(Arc::clone(entry.value())),
            None => Err(self.not_found(id)),
        }
    }

    /// 移除会话并记录墓碑
    pub fn remove(&self, id: &str, reason: SessionGone) -> SessionResult<Arc<SessionSlot>> {
        match self.sessions.remove(id) {
            Some((id, slot)) => {
                self.forget(id, reason);
                Ok(slot)
            }
            None => Err(self.not_found(id)),
        }
    }

    /// 按回收策略取出所有过期会话
    ///
    /// 判定与移除在同一个分片锁内完成，刚被使用过的会话不会被误删。
    pub fn collect_expired(&self, now: Instant) -> Vec<Arc<SessionSlot>> {
        let candidates: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| self.policy.should_evict(entry.value(), now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut expired = Vec::with_capacity(candidates.len());
        for id in candidates {
            if let Some((id, slot)) = self
                .sessions
                .remove_if(&id, |_, slot| self.policy.should_evict(slot, now))
            {
                info!("Reclaiming expired session {}", id);
                self.forget(id, SessionGone::Expired);
                expired.push(slot);
            }
        }
        if !expired.is_empty() {
            info!("Reclaimed {} expired sessions", expired.len());
        }
        expired
    }

    /// 取出全部会话（进程退出时使用）
    pub fn drain(&self) -> Vec<Arc<SessionSlot>> {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.into_iter()
            .filter_map(|id| self.remove(&id, SessionGone::Closed).ok())
            .collect()
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self.sessions.iter().map(|e| e.value().info()).collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        infos
    }

    pub fn info(&self, id: &str) -> SessionResult<SessionInfo> {
        self.resolve(id).map(|slot| slot.info())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    fn forget(&self, id: String, reason: SessionGone) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        debug!("Session {} removed ({})", id, reason);
        self.tombstones.insert(id, reason);
    }

    fn not_found(&self, id: &str) -> SessionError {
        let reason = match self.tombstones.get(id) {
            Some(reason) => reason,
            None if self.ids.is_issued(id) => SessionGone::Closed,
            None => SessionGone::Unknown,
        };
        SessionError::not_found(id, reason)
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions.len())
            .field("max_sessions", &self.max_sessions)
            .field("policy", &self.policy)
            .finish()
    }
}
