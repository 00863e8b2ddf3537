//! 文件检查点
//!
//! 每个线程一个 JSON 文件（目录下 `<线程 id 编码>.json`）；先写临时文件再 rename，
//! 保证一次 save 要么完整落盘、要么不生效。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::core::AgentState;
use crate::memory::checkpoint::{decode_state, encode_state, CheckpointError, CheckpointStore};

/// JSON 文件检查点存储
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// 线程 id 对应的文件路径；非 [A-Za-z0-9_-] 字符编码为 %XX，不同 id 不会映射到同一文件
    pub fn path_for(&self, thread_id: &str) -> PathBuf {
        let mut name = String::with_capacity(thread_id.len() + 5);
        for b in thread_id.bytes() {
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
                name.push(b as char);
            } else {
                name.push_str(&format!("%{:02X}", b));
            }
        }
        name.push_str(".json");
        self.dir.join(name)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<AgentState>, CheckpointError> {
        let path = self.path_for(thread_id);
        match fs::read_to_string(&path).await {
            Ok(raw) => decode_state(&raw).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, thread_id: &str, state: &AgentState) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(thread_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, encode_state(state)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_roundtrip_and_resave() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoints"));
        assert!(store.load("t1").await.unwrap().is_none());

        let mut state = AgentState::default();
        state.begin_turn("2+2?", false);
        state.messages.push(Message::assistant("4"));
        store.save("t1", &state).await.unwrap();

        let first = std::fs::read(store.path_for("t1")).unwrap();
        let loaded = store.load("t1").await.unwrap().unwrap();
        assert_eq!(loaded, state);

        store.save("t1", &loaded).await.unwrap();
        let second = std::fs::read(store.path_for("t1")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_thread_ids_are_encoded() {
        let store = FileCheckpointStore::new("/tmp/cp");
        assert_eq!(store.path_for("t-1_a"), PathBuf::from("/tmp/cp/t-1_a.json"));
        assert_eq!(
            store.path_for("../etc"),
            PathBuf::from("/tmp/cp/%2E%2E%2Fetc.json")
        );
        assert_ne!(store.path_for("a/b"), store.path_for("a%2Fb"));
    }
}
