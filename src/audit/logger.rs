//! 后台审计写入
//!
//! 投递用 `try_send`，队列满或已关闭时丢弃并计数，调用方从不等待存储。

use log::{debug, error, warn};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{AuditSink, HistoryRecord};
use crate::config::AuditConfig;

/// 审计计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub enqueued: u64,
    pub written: u64,
    /// 队列满或已关闭而丢弃
    pub dropped: u64,
    /// 重试用尽仍失败
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    written: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

enum Message {
    Record(HistoryRecord),
    Flush(oneshot::Sender<()>),
}

pub struct AuditLogger {
    sender: RwLock<Option<mpsc::Sender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl AuditLogger {
    /// 启动后台写入任务，必须在 tokio 运行时内调用
    pub fn spawn(sink: Arc<dyn AuditSink>, config: &AuditConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker = tokio::spawn(run_worker(
            rx,
            sink,
            Arc::clone(&counters),
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
        ));
        Self {
            sender: RwLock::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            counters,
        }
    }

    /// 不写任何记录
    pub fn disabled() -> Self {
        Self {
            sender: RwLock::new(None),
            worker: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.read().is_some()
    }

    /// 投递一条记录，不等待
    pub fn record(&self, record: HistoryRecord) {
        let guard = self.sender.read();
        let Some(sender) = guard.as_ref() else {
            return;
        };
        match sender.try_send(Message::Record(record)) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("polystore_audit_enqueued_total").increment(1);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("polystore_audit_dropped_total").increment(1);
                warn!("Audit queue is full, dropping history record");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("polystore_audit_dropped_total").increment(1);
                warn!("Audit worker has stopped, dropping history record");
            }
        }
    }

    /// 等待此前投递的记录全部处理完
    pub async fn flush(&self) {
        let sender = self.sender.read().clone();
        let Some(sender) = sender else {
            return;
        };
        let (tx, rx) = oneshot::channel();
        if sender.send(Message::Flush(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// 关闭队列并等待后台任务写完剩余记录
    pub async fn shutdown(&self) {
        drop(self.sender.write().take());
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Audit worker terminated abnormally: {}", e);
            }
        }
    }

    pub fn stats(&self) -> AuditStats {
        AuditStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Message>,
    sink: Arc<dyn AuditSink>,
    counters: Arc<Counters>,
    max_retries: u32,
    backoff: Duration,
) {
    while let Some(message) = rx.recv().await {
        let record = match message {
            Message::Record(record) => record,
            Message::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };

        let mut attempt = 0;
        loop {
            match sink.append(&record).await {
                Ok(()) => {
                    counters.written.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("polystore_audit_written_total").increment(1);
                    break;
                }
                Err(e) if attempt < max_retries => {
                    attempt += 1;
                    debug!("Audit write failed (attempt {}): {}", attempt, e);
                    tokio::time::sleep(backoff * attempt).await;
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("polystore_audit_failed_total").increment(1);
                    error!(
                        "Failed to save history for connection {} after {} attempts: {}",
                        record.connection_id(),
                        attempt + 1,
                        e
                    );
                    break;
                }
            }
        }
    }
    debug!("Audit worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{MemoryAuditSink, OperationKind};
    use crate::core::types::BackendType;

    fn record(id: &str) -> HistoryRecord {
        HistoryRecord::operation(id, BackendType::Memory, OperationKind::Connect, None)
    }

    fn config(capacity: usize, retries: u32) -> AuditConfig {
        AuditConfig {
            queue_capacity: capacity,
            max_retries: retries,
            retry_backoff_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_records_are_written() {
        let sink = Arc::new(MemoryAuditSink::new());
        let logger = AuditLogger::spawn(sink.clone(), &config(16, 0));
        logger.record(record("a"));
        logger.record(record("b"));
        logger.flush().await;

        assert_eq!(sink.len(), 2);
        assert_eq!(logger.stats().written, 2);
        logger.shutdown().await;
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let sink = Arc::new(MemoryAuditSink::new());
        sink.fail_next(2);
        let logger = AuditLogger::spawn(sink.clone(), &config(16, 3));
        logger.record(record("a"));
        logger.flush().await;

        let stats = logger.stats();
        assert_eq!(stats.written, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted_are_counted() {
        let sink = Arc::new(MemoryAuditSink::new());
        sink.fail_next(10);
        let logger = AuditLogger::spawn(sink.clone(), &config(16, 2));
        logger.record(record("a"));
        logger.flush().await;

        let stats = logger.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.written, 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_record_after_shutdown_is_dropped() {
        let sink = Arc::new(MemoryAuditSink::new());
        let logger = AuditLogger::spawn(sink.clone(), &config(4, 0));
        logger.shutdown().await;
        assert!(!logger.is_enabled());

        logger.record(record("late"));
        assert_eq!(logger.stats().enqueued, 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_logger_is_a_no_op() {
        let logger = AuditLogger::disabled();
        logger.record(record("a"));
        logger.flush().await;
        logger.shutdown().await;
        assert_eq!(logger.stats(), AuditStats::default());
    }
}
