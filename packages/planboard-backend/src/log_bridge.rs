/// Process-wide logger: env_logger filtering and stderr output, plus a bounded
/// ring of recent entries and a broadcast feed for `/logs/stream`.
use env_logger::Logger;
use log::{Log, Metadata, Record, SetLoggerError};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{LazyLock, Mutex};
use tokio::sync::broadcast;

const MAX_LOG_ENTRIES: usize = 1000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp_ms: i64,
    pub level: String,
    pub target: String,
    pub message: String,
}

struct LogRing {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
    tx: broadcast::Sender<LogEntry>,
}

impl LogRing {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            tx,
        }
    }

    fn push(&self, entry: LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }
        // no receivers is fine
        let _ = self.tx.send(entry);
    }

    fn snapshot(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }
}

static LOG_RING: LazyLock<LogRing> = LazyLock::new(|| LogRing::new(MAX_LOG_ENTRIES));

struct BridgeLogger {
    inner: Logger,
}

impl Log for BridgeLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.inner.matches(record) {
            return;
        }
        self.inner.log(record);
        LOG_RING.push(LogEntry {
            timestamp_ms: now_ms(),
            level: record.level().as_str().to_lowercase(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        });
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Install the logger. Filter comes from RUST_LOG, `info` when unset.
pub fn init() -> Result<(), SetLoggerError> {
    let inner = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .build();
    let max_level = inner.filter();
    log::set_boxed_logger(Box::new(BridgeLogger { inner }))?;
    log::set_max_level(max_level);
    Ok(())
}

pub fn recent_entries() -> Vec<LogEntry> {
    LOG_RING.snapshot()
}

pub fn subscribe() -> broadcast::Receiver<LogEntry> {
    LOG_RING.tx.subscribe()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(message: &str) -> LogEntry {
        LogEntry {
            timestamp_ms: 0,
            level: "info".into(),
            target: "planboard.test".into(),
            message: message.into(),
        }
    }

    #[test]
    fn test_ring_drops_oldest() {
        let ring = LogRing::new(2);
        ring.push(entry("one"));
        ring.push(entry("two"));
        ring.push(entry("three"));
        let messages: Vec<_> = ring.snapshot().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["two", "three"]);
    }

    #[test]
    fn test_subscribers_see_new_entries() {
        let ring = LogRing::new(4);
        let mut rx = ring.tx.subscribe();
        ring.push(entry("hello"));
        assert_eq!(rx.try_recv().unwrap().message, "hello");
    }
}
