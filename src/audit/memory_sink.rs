use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::{AuditError, AuditSink, HistoryRecord, OperationRecord, QueryRecord};

pub const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

/// 进程内历史存储
///
/// 定长环形缓冲：写满后丢弃最旧的记录。
#[derive(Debug)]
pub struct MemoryAuditSink {
    records: Mutex<VecDeque<HistoryRecord>>,
    capacity: usize,
    evicted: AtomicU64,
    failures_pending: AtomicU32,
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_MEMORY_CAPACITY))),
            capacity,
            evicted: AtomicU64::new(0),
            failures_pending: AtomicU32::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 因容量上限被丢弃的记录数
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// 让接下来的 n 次写入失败
    pub fn fail_next(&self, n: u32) {
        self.failures_pending.store(n, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<HistoryRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn queries(&self) -> Vec<QueryRecord> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                HistoryRecord::Query(q) => Some(q.clone()),
                HistoryRecord::Operation(_) => None,
            })
            .collect()
    }

    pub fn operations(&self) -> Vec<OperationRecord> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                HistoryRecord::Operation(o) => Some(o.clone()),
                HistoryRecord::Query(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: &HistoryRecord) -> Result<(), AuditError> {
        let injected = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AuditError::Sink("injected failure".to_string()));
        }
        let mut records = self.records.lock();
        if records.len() >= self.capacity {
            records.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("polystore_audit_memory_evicted_total").increment(1);
        }
        records.push_back(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::OperationKind;
    use crate::core::types::BackendType;

    fn connect_record(id: &str) -> HistoryRecord {
        HistoryRecord::operation(id, BackendType::Memory, OperationKind::Connect, None)
    }

    #[tokio::test]
    async fn test_oldest_records_are_dropped_at_capacity() {
        let sink = MemoryAuditSink::with_capacity(3);
        for i in 0..5 {
            sink.append(&connect_record(&format!("s{}", i)))
                .await
                .expect("append");
        }
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.evicted(), 2);
        let ids: Vec<String> = sink
            .operations()
            .into_iter()
            .map(|o| o.connection_id)
            .collect();
        assert_eq!(ids, vec!["s2", "s3", "s4"]);
    }

    #[tokio::test]
    async fn test_injected_failures_are_not_stored() {
        let sink = MemoryAuditSink::new();
        sink.fail_next(1);
        assert!(sink.append(&connect_record("a")).await.is_err());
        sink.append(&connect_record("b")).await.expect("append");
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.capacity(), DEFAULT_MEMORY_CAPACITY);
    }
}
