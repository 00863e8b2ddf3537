//! 线程监管：按线程串行化回合，并提供回合内的协作式停止
//!
//! 同一 thread_id 的两次 run_turn 不会交错（持有线程锁直到回合结束）；不同线程之间互不阻塞。
//! 每个回合拿到一个新的 CancellationToken，request_stop 只在下一次入口守卫时生效，不打断进行中的调用。
//! 线程槽位只在有回合进行或等待时存在，最后一个许可释放时移除。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

type SlotMap = Arc<Mutex<HashMap<String, Arc<ThreadSlot>>>>;

#[derive(Default)]
struct ThreadSlot {
    turn_lock: Arc<tokio::sync::Mutex<()>>,
    stop: Mutex<CancellationToken>,
}

/// 回合许可：持有期间该线程的其它回合等待
pub struct TurnPermit {
    guard: Option<OwnedMutexGuard<()>>,
    stop: CancellationToken,
    thread_id: String,
    slot: Arc<ThreadSlot>,
    threads: SlotMap,
}

impl TurnPermit {
    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }
}

impl Drop for TurnPermit {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        // 表中一份 + 本许可一份：没有其它回合在进行或等待
        let idle = threads
            .get(&self.thread_id)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot) && Arc::strong_count(slot) == 2);
        if idle {
            threads.remove(&self.thread_id);
        }
    }
}

/// 线程级监管
#[derive(Default)]
pub struct SessionSupervisor {
    threads: SlotMap,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, thread_id: &str) -> Arc<ThreadSlot> {
        let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        threads
            .entry(thread_id.to_string())
            .or_default()
            .clone()
    }

    /// 等待并获取线程回合许可；同时为本回合换上新的停止令牌
    pub async fn begin_turn(&self, thread_id: &str) -> TurnPermit {
        let slot = self.slot(thread_id);
        let guard = slot.turn_lock.clone().lock_owned().await;
        let token = CancellationToken::new();
        *slot.stop.lock().unwrap_or_else(|e| e.into_inner()) = token.clone();
        TurnPermit {
            guard: Some(guard),
            stop: token,
            thread_id: thread_id.to_string(),
            slot,
            threads: self.threads.clone(),
        }
    }

    /// 请求停止该线程正在进行的回合；没有进行中的回合时返回 false
    pub fn request_stop(&self, thread_id: &str) -> bool {
        let threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = threads.get(thread_id) else {
            return false;
        };
        if slot.turn_lock.try_lock().is_ok() {
            return false;
        }
        slot.stop.lock().unwrap_or_else(|e| e.into_inner()).cancel();
        true
    }

    /// 当前有回合进行或等待的线程数
    pub fn thread_count(&self) -> usize {
        self.threads.lock().map(|t| t.len()).unwrap_or(0)
    }
}
