//! 检查点存储抽象
//!
//! 按线程 id 持久化完整 AgentState。实现须支持多线程并发访问，
//! 且对同一线程满足读己之写（save 之后紧接的 load 必须看到该次 save）。

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::core::AgentState;

/// 检查点读写错误
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[cfg(feature = "async-sqlite")]
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// 检查点存储接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 读取线程状态；线程不存在时返回 None
    async fn load(&self, thread_id: &str) -> Result<Option<AgentState>, CheckpointError>;

    /// 整体写入线程状态
    async fn save(&self, thread_id: &str, state: &AgentState) -> Result<(), CheckpointError>;
}

/// 状态的规范序列化形式（各实现共用，保证重复保存字节一致）
pub fn encode_state(state: &AgentState) -> Result<String, CheckpointError> {
    Ok(serde_json::to_string(state)?)
}

pub fn decode_state(raw: &str) -> Result<AgentState, CheckpointError> {
    Ok(serde_json::from_str(raw)?)
}

/// 内存检查点：保存序列化后的 JSON，线程之间不共享任何可变数据
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    snapshots: RwLock<HashMap<String, String>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 原始持久化内容（用于比对字节一致性）
    pub async fn raw(&self, thread_id: &str) -> Option<String> {
        self.snapshots.read().await.get(thread_id).cloned()
    }

    pub async fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.snapshots.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<AgentState>, CheckpointError> {
        match self.snapshots.read().await.get(thread_id) {
            Some(raw) => decode_state(raw).map(Some),
            None => Ok(None),
        }
    }

    async fn save(&self, thread_id: &str, state: &AgentState) -> Result<(), CheckpointError> {
        let raw = encode_state(state)?;
        self.snapshots
            .write()
            .await
            .insert(thread_id.to_string(), raw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolStatus;
    use crate::memory::{Message, ToolCallRequest};

    fn sample_state() -> AgentState {
        let mut state = AgentState::default();
        state.begin_turn("2+2?", false);
        state.messages.push(Message::assistant_with_tool_calls(
            "",
            vec![ToolCallRequest::new(
                "call_1",
                "calc",
                serde_json::json!({"expr": "2+2", "precision": 2}),
            )],
        ));
        state.messages.push(Message::tool("4", "call_1"));
        state.tool_status = Some(ToolStatus::Success);
        state
    }

    #[tokio::test]
    async fn test_missing_thread_loads_none() {
        let store = MemoryCheckpointStore::new();
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_after_write() {
        let store = MemoryCheckpointStore::new();
        let state = sample_state();
        store.save("t1", &state).await.unwrap();
        assert_eq!(store.load("t1").await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_resave_is_byte_identical() {
        let store = MemoryCheckpointStore::new();
        store.save("t1", &sample_state()).await.unwrap();
        let first = store.raw("t1").await.unwrap();

        let loaded = store.load("t1").await.unwrap().unwrap();
        store.save("t1", &loaded).await.unwrap();
        assert_eq!(store.raw("t1").await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_threads_are_isolated() {
        let store = MemoryCheckpointStore::new();
        let mut a = AgentState::default();
        a.begin_turn("from a", false);
        let mut b = AgentState::default();
        b.begin_turn("from b", true);
        store.save("a", &a).await.unwrap();
        store.save("b", &b).await.unwrap();

        let loaded_a = store.load("a").await.unwrap().unwrap();
        assert_eq!(loaded_a.final_content(), "from a");
        assert!(!loaded_a.stop_requested);
        assert_eq!(store.thread_ids().await, vec!["a".to_string(), "b".to_string()]);
    }
}
