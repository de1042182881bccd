/// Change broadcaster.
///
/// `BroadcastHub` is an injectable, per-process registry of subscribers grouped
/// into topic rooms and keyed by connection id. Connections are torn down with
/// `unregister`; senders whose receiver has gone away are pruned on publish.
///
/// `Outbox` sits between the engine and a `Publisher`: the engine enqueues a
/// record while it still holds the board lock (a non-blocking channel send), and
/// one dispatcher task per board drains the queue and publishes in commit order.
/// Publishing therefore never runs under the board lock, yet per-board ordering
/// holds.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::events::{board_topic, ChangeRecord};

/// Real-time transport collaborator.
pub trait Publisher: Send + Sync {
    /// Deliver a record to every subscriber of `topic`. Returns the number of
    /// subscribers reached. Best-effort: the caller never retries.
    fn publish(&self, topic: &str, record: &ChangeRecord) -> Result<usize, PublishError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Subscriber registry lock poisoned")]
    RegistryPoisoned,

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// A live subscription. Hand `connection_id` back to `BroadcastHub::unregister`
/// when the connection closes.
pub struct Subscription {
    pub connection_id: u64,
    pub topic: String,
    pub receiver: mpsc::UnboundedReceiver<Arc<ChangeRecord>>,
}

#[derive(Default)]
struct Room {
    subscribers: HashMap<u64, mpsc::UnboundedSender<Arc<ChangeRecord>>>,
}

pub struct BroadcastHub {
    rooms: Mutex<HashMap<String, Room>>,
    next_connection_id: AtomicU64,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Register a new connection on a topic.
    pub fn subscribe(&self, topic: &str) -> Result<Subscription, PublishError> {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut rooms = self.rooms.lock().map_err(|_| PublishError::RegistryPoisoned)?;
        rooms
            .entry(topic.to_string())
            .or_default()
            .subscribers
            .insert(connection_id, tx);
        log::debug!(
            target: "planboard.broadcast",
            "Connection {} subscribed to {}",
            connection_id,
            topic
        );
        Ok(Subscription {
            connection_id,
            topic: topic.to_string(),
            receiver: rx,
        })
    }

    /// Remove a connection. Empty rooms are dropped.
    pub fn unregister(&self, topic: &str, connection_id: u64) -> bool {
        let Ok(mut rooms) = self.rooms.lock() else {
            return false;
        };
        let removed = match rooms.get_mut(topic) {
            Some(room) => {
                let removed = room.subscribers.remove(&connection_id).is_some();
                if room.subscribers.is_empty() {
                    rooms.remove(topic);
                }
                removed
            }
            None => false,
        };
        if removed {
            log::debug!(
                target: "planboard.broadcast",
                "Connection {} left {}",
                connection_id,
                topic
            );
        }
        removed
    }

    /// Drop every subscriber of a topic; their receivers see the stream end.
    pub fn close_topic(&self, topic: &str) -> usize {
        self.rooms
            .lock()
            .ok()
            .and_then(|mut rooms| rooms.remove(topic))
            .map_or(0, |room| room.subscribers.len())
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.rooms
            .lock()
            .ok()
            .and_then(|rooms| rooms.get(topic).map(|r| r.subscribers.len()))
            .unwrap_or(0)
    }
}

impl Publisher for BroadcastHub {
    fn publish(&self, topic: &str, record: &ChangeRecord) -> Result<usize, PublishError> {
        let mut rooms = self.rooms.lock().map_err(|_| PublishError::RegistryPoisoned)?;
        let Some(room) = rooms.get_mut(topic) else {
            return Ok(0);
        };
        let shared = Arc::new(record.clone());
        room.subscribers
            .retain(|_, tx| tx.send(Arc::clone(&shared)).is_ok());
        let delivered = room.subscribers.len();
        if delivered == 0 {
            rooms.remove(topic);
        }
        Ok(delivered)
    }
}

/// Per-board ordered dispatch of change records to a publisher.
pub struct Outbox {
    publisher: Arc<dyn Publisher>,
    queues: Mutex<HashMap<String, mpsc::UnboundedSender<ChangeRecord>>>,
}

impl Outbox {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            publisher,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Queue a committed record. Never blocks and never fails the caller.
    pub fn enqueue(&self, record: ChangeRecord) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                // No runtime to host a dispatcher: publish inline.
                deliver(self.publisher.as_ref(), &record);
                return;
            }
        };

        let Ok(mut queues) = self.queues.lock() else {
            log::warn!(
                target: "planboard.broadcast",
                "Outbox lock poisoned, dropping {} for board {}",
                record.event.kind(),
                record.board_id
            );
            return;
        };

        let board_id = record.board_id.clone();
        let record = match queues.get(&board_id) {
            Some(tx) => match tx.send(record) {
                Ok(()) => return,
                // Dispatcher gone; fall through and start a new one.
                Err(mpsc::error::SendError(record)) => record,
            },
            None => record,
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<ChangeRecord>();
        let publisher = Arc::clone(&self.publisher);
        handle.spawn(async move {
            while let Some(record) = rx.recv().await {
                deliver(publisher.as_ref(), &record);
            }
        });
        if tx.send(record).is_ok() {
            queues.insert(board_id, tx);
        }
    }

    /// Stop the dispatcher for a board once its queue drains.
    pub fn close(&self, board_id: &str) {
        if let Ok(mut queues) = self.queues.lock() {
            queues.remove(board_id);
        }
    }
}

fn deliver(publisher: &dyn Publisher, record: &ChangeRecord) {
    let topic = board_topic(&record.board_id);
    match publisher.publish(&topic, record) {
        Ok(delivered) => log::debug!(
            target: "planboard.broadcast",
            "Published {} v{} to {} subscribers on {}",
            record.event.kind(),
            record.version,
            delivered,
            topic
        ),
        Err(e) => log::warn!(
            target: "planboard.broadcast",
            "Failed to publish {} v{} on {}: {}",
            record.event.kind(),
            record.version,
            topic,
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BoardEvent;
    use crate::types::Board;

    fn record(board: &Board, version: u64) -> ChangeRecord {
        let mut board = board.clone();
        board.version = version;
        ChangeRecord::new(
            &board,
            None,
            BoardEvent::ColumnUpdated {
                column_id: "c".into(),
                title: format!("v{}", version),
            },
        )
    }

    #[test]
    fn test_publish_reaches_topic_subscribers_only() {
        let hub = BroadcastHub::new();
        let board = Board::new("Main", None, None);
        let topic = board_topic(&board.id);
        let mut a = hub.subscribe(&topic).unwrap();
        let mut other = hub.subscribe("board:other").unwrap();

        let delivered = hub.publish(&topic, &record(&board, 1)).unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(a.receiver.try_recv().unwrap().version, 1);
        assert!(other.receiver.try_recv().is_err());
    }

    #[test]
    fn test_unregister_tears_down_room() {
        let hub = BroadcastHub::new();
        let sub = hub.subscribe("board:x").unwrap();
        assert_eq!(hub.subscriber_count("board:x"), 1);
        assert!(hub.unregister("board:x", sub.connection_id));
        assert!(!hub.unregister("board:x", sub.connection_id));
        assert_eq!(hub.subscriber_count("board:x"), 0);
    }

    #[test]
    fn test_dropped_receivers_are_pruned() {
        let hub = BroadcastHub::new();
        let board = Board::new("Main", None, None);
        let topic = board_topic(&board.id);
        let kept = hub.subscribe(&topic).unwrap();
        let dropped = hub.subscribe(&topic).unwrap();
        drop(dropped);

        assert_eq!(hub.publish(&topic, &record(&board, 1)).unwrap(), 1);
        assert_eq!(hub.subscriber_count(&topic), 1);
        drop(kept);
    }

    #[test]
    fn test_close_topic_ends_streams() {
        let hub = BroadcastHub::new();
        let mut sub = hub.subscribe("board:x").unwrap();
        assert_eq!(hub.close_topic("board:x"), 1);
        assert!(matches!(
            sub.receiver.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    struct FailingPublisher;

    impl Publisher for FailingPublisher {
        fn publish(&self, _topic: &str, _record: &ChangeRecord) -> Result<usize, PublishError> {
            Err(PublishError::Unavailable("down".into()))
        }
    }

    #[test]
    fn test_outbox_without_runtime_publishes_inline() {
        let hub = Arc::new(BroadcastHub::new());
        let board = Board::new("Main", None, None);
        let mut sub = hub.subscribe(&board_topic(&board.id)).unwrap();
        let outbox = Outbox::new(hub.clone());

        outbox.enqueue(record(&board, 4));
        assert_eq!(sub.receiver.try_recv().unwrap().version, 4);

        // failures are swallowed
        Outbox::new(Arc::new(FailingPublisher)).enqueue(record(&board, 5));
    }

    #[tokio::test]
    async fn test_outbox_preserves_commit_order() {
        let hub = Arc::new(BroadcastHub::new());
        let board = Board::new("Main", None, None);
        let mut sub = hub.subscribe(&board_topic(&board.id)).unwrap();
        let outbox = Outbox::new(hub.clone());

        for version in 1..=50 {
            outbox.enqueue(record(&board, version));
        }
        for expected in 1..=50 {
            let got = sub.receiver.recv().await.unwrap();
            assert_eq!(got.version, expected);
        }
    }
}
