//! 异步 SQLite 检查点（sqlx）
//!
//! 每次 save 追加一行（thread_id, step, state），load 取该线程最新一行；
//! 设置 keep_last 时每次 save 后只保留该线程最近 n 个检查点。
//! 需要启用 `async-sqlite` feature。

#[cfg(feature = "async-sqlite")]
mod sqlx_impl {
    use std::path::Path;
    use std::time::Duration;

    use async_trait::async_trait;
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
    use sqlx::Row;

    use crate::core::AgentState;
    use crate::memory::checkpoint::{decode_state, encode_state, CheckpointError, CheckpointStore};

    /// 写锁等待上限
    const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

    /// SQLite 检查点存储
    pub struct SqliteCheckpointStore {
        pool: SqlitePool,
        keep_last: Option<i64>,
    }

    impl SqliteCheckpointStore {
        pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, sqlx::Error> {
            let db_path = db_path.as_ref();
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
                }
            }
            let options = SqliteConnectOptions::new()
                .filename(db_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(BUSY_TIMEOUT);

            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?;

            let store = Self {
                pool,
                keep_last: None,
            };
            store.init_tables().await?;
            Ok(store)
        }

        /// 每个线程只保留最近 keep 个检查点（至少 1 个）
        pub fn with_retention(mut self, keep: u32) -> Self {
            self.keep_last = Some(i64::from(keep.max(1)));
            self
        }

        async fn init_tables(&self) -> Result<(), sqlx::Error> {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS checkpoints (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    thread_id TEXT NOT NULL,
                    step INTEGER NOT NULL,
                    state TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_checkpoints_thread ON checkpoints(thread_id, id)",
            )
            .execute(&self.pool)
            .await?;

            Ok(())
        }

        /// 最新检查点的步号与原始 JSON
        async fn latest_raw(&self, thread_id: &str) -> Result<Option<(i64, String)>, sqlx::Error> {
            let row = sqlx::query(
                "SELECT step, state FROM checkpoints WHERE thread_id = ? ORDER BY id DESC LIMIT 1",
            )
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await?;

            Ok(row.map(|row| {
                let step: i64 = row.get("step");
                let state: String = row.get("state");
                (step, state)
            }))
        }

        async fn prune(&self, thread_id: &str, keep: i64) -> Result<u64, sqlx::Error> {
            let result = sqlx::query(
                "DELETE FROM checkpoints WHERE thread_id = ? AND id NOT IN (
                    SELECT id FROM checkpoints WHERE thread_id = ? ORDER BY id DESC LIMIT ?
                )",
            )
            .bind(thread_id)
            .bind(thread_id)
            .bind(keep)
            .execute(&self.pool)
            .await?;

            Ok(result.rows_affected())
        }
    }

    #[async_trait]
    impl CheckpointStore for SqliteCheckpointStore {
        async fn load(&self, thread_id: &str) -> Result<Option<AgentState>, CheckpointError> {
            match self.latest_raw(thread_id).await? {
                Some((_, raw)) => decode_state(&raw).map(Some),
                None => Ok(None),
            }
        }

        async fn save(&self, thread_id: &str, state: &AgentState) -> Result<(), CheckpointError> {
            let raw = encode_state(state)?;
            let now = chrono::Utc::now().to_rfc3339();

            // 单条语句：从一开始就持有写锁，并发写入只会排队等待 busy_timeout
            sqlx::query(
                "INSERT INTO checkpoints (thread_id, step, state, created_at)
                 SELECT ?, COALESCE(MAX(step), -1) + 1, ?, ? FROM checkpoints WHERE thread_id = ?",
            )
            .bind(thread_id)
            .bind(&raw)
            .bind(&now)
            .bind(thread_id)
            .execute(&self.pool)
            .await?;

            if let Some(keep) = self.keep_last {
                let removed = self.prune(thread_id, keep).await?;
                if removed > 0 {
                    tracing::debug!(thread_id, removed, "pruned old checkpoints");
                }
            }
            Ok(())
        }
    }

}

#[cfg(feature = "async-sqlite")]
pub use sqlx_impl::SqliteCheckpointStore;
