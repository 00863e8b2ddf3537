//! 任务调度：工具调用的有界工作池
//!
//! 每次工具调用作为独立 tokio 任务运行（不占用编排器所在的执行路径），
//! 用 Semaphore 限制全局并发；任务内 panic 通过 JoinError 转为错误返回。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio::time::error::Elapsed;

/// 工具工作池
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    /// 工具并发限制（默认 3）
    tool_semaphore: Arc<Semaphore>,
}

impl TaskScheduler {
    pub fn new(max_concurrent_tools: usize) -> Self {
        Self {
            tool_semaphore: Arc::new(Semaphore::new(max_concurrent_tools.max(1))),
        }
    }

    /// 取得许可后在独立任务中运行 fut 并等待其结束；limit 只计 fut 自身的运行时间，排队等待许可不计入。
    /// 外层 Err 表示任务 panic 或被取消，内层 Err 表示超时。
    pub async fn run_tool<F, T>(&self, fut: F, limit: Duration) -> Result<Result<T, Elapsed>, JoinError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        // 信号量从不关闭，acquire 只会等待，不会失败
        let permit = self.tool_semaphore.clone().acquire_owned().await.ok();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            tokio::time::timeout(limit, fut).await
        });
        let mut guard = AbortOnDrop(handle);
        (&mut guard.0).await
    }

    pub fn available_permits(&self) -> usize {
        self.tool_semaphore.available_permits()
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(3)
    }
}

/// 等待方被丢弃（如外层超时）时中止任务；对已结束的任务 abort 无副作用
struct AbortOnDrop<T>(tokio::task::JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// 从 panic 负载中取出文本
pub fn panic_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LIMIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_run_tool_returns_value() {
        let sched = TaskScheduler::new(1);
        assert_eq!(sched.run_tool(async { 41 + 1 }, LIMIT).await.unwrap().unwrap(), 42);
        assert_eq!(sched.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let sched = TaskScheduler::default();
        let err = sched
            .run_tool(
                async {
                    panic!("kaboom");
                },
                LIMIT,
            )
            .await
            .map(|_: Result<(), Elapsed>| ())
            .unwrap_err();
        assert_eq!(panic_message(err), "kaboom");
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let sched = TaskScheduler::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let sched = sched.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                sched
                    .run_tool(
                        async move {
                            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            running.fetch_sub(1, Ordering::SeqCst);
                        },
                        LIMIT,
                    )
                    .await
                    .unwrap()
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_queue_wait_does_not_count_against_limit() {
        let sched = TaskScheduler::new(1);
        let long = {
            let sched = sched.clone();
            tokio::spawn(async move {
                sched
                    .run_tool(tokio::time::sleep(Duration::from_millis(400)), LIMIT)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // 排队约 350ms，自身只运行 50ms，300ms 的上限不应触发
        let short = sched
            .run_tool(
                async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    "short"
                },
                Duration::from_millis(300),
            )
            .await
            .unwrap();
        assert_eq!(short.unwrap(), "short");
        assert!(long.await.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_limit_applies_to_run_time() {
        let sched = TaskScheduler::new(1);
        let out = sched
            .run_tool(tokio::time::sleep(Duration::from_secs(5)), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(out.is_err());
        assert_eq!(sched.available_permits(), 1);
    }
}
