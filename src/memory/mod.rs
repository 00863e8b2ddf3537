//! 记忆层：对话记录（MessageLog）与按线程的检查点持久化（内存 / JSON 文件 / SQLite）

pub mod async_persistence;
pub mod checkpoint;
pub mod conversation;
pub mod persistence;

#[cfg(feature = "async-sqlite")]
pub use async_persistence::SqliteCheckpointStore;
pub use checkpoint::{CheckpointError, CheckpointStore, MemoryCheckpointStore};
pub use conversation::{Message, MessageLog, Role, ToolCallRequest};
pub use persistence::FileCheckpointStore;
