/// Planboard core: column ordering, task placement and the board engine.
pub mod board;
pub mod broadcast;
pub mod engine;
pub mod error;
pub mod events;
pub mod reconcile;
pub mod storage;
pub mod types;

pub use broadcast::{BroadcastHub, Outbox, PublishError, Publisher, Subscription};
pub use engine::{BoardEngine, EngineConfig, MoveResult};
pub use error::{BoardError, BoardResult, EntityKind};
pub use events::{board_topic, BoardEvent, ChangeRecord};
pub use types::{Board, BoardView, Column, ColumnView, NewTask, Priority, Task, TaskStatus};
