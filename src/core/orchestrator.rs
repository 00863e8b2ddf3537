//! Orchestrator：按线程驱动 Reasoning ⇄ ToolExecution 状态机
//!
//! 每次 run_turn：取得线程锁 → 从 CheckpointStore 读取（或新建）状态 → 追加用户输入 →
//! 循环（入口守卫 → 执行一步 → 写检查点）直到 Halted。
//! 推理后端或检查点失败是致命错误，直接返回；失败的那一步不写检查点。

use std::sync::Arc;

use tracing::Instrument;

use crate::core::{AgentError, AgentState, HaltReason, Phase, SessionSupervisor};
use crate::memory::{CheckpointStore, Message};
use crate::react::{execute_tool_calls, ActOutcome, Planner};
use crate::tools::ToolExecutor;

/// 单轮默认最大步数（推理步与工具步合计）
pub const DEFAULT_MAX_STEPS: usize = 25;

/// 一轮的结果
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// 最后一条消息的内容，说明本轮为何结束
    pub final_content: String,
    pub history: Vec<Message>,
    pub state: AgentState,
    pub reason: HaltReason,
}

/// 编排器：所有线程共享同一个实例
pub struct Orchestrator {
    planner: Planner,
    executor: ToolExecutor,
    store: Arc<dyn CheckpointStore>,
    supervisor: SessionSupervisor,
    max_steps: usize,
}

impl Orchestrator {
    pub fn new(planner: Planner, executor: ToolExecutor, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            planner,
            executor,
            store,
            supervisor: SessionSupervisor::new(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// 请求停止某线程正在进行的回合：在下一次入口守卫时生效
    pub fn request_stop(&self, thread_id: &str) -> bool {
        self.supervisor.request_stop(thread_id)
    }

    /// 执行一轮对话
    pub async fn run_turn(
        &self,
        thread_id: &str,
        user_input: &str,
        stop: bool,
    ) -> Result<TurnOutcome, AgentError> {
        let span = tracing::info_span!("turn", thread_id = %thread_id);
        self.drive(thread_id, user_input, stop).instrument(span).await
    }

    async fn drive(
        &self,
        thread_id: &str,
        user_input: &str,
        stop: bool,
    ) -> Result<TurnOutcome, AgentError> {
        let permit = self.supervisor.begin_turn(thread_id).await;

        let mut state = self.store.load(thread_id).await?.unwrap_or_default();
        state.begin_turn(user_input, stop);

        let mut phase = Phase::Reasoning;
        let mut steps = 0usize;

        let reason = loop {
            if permit.stop_token().is_cancelled() {
                state.stop_requested = true;
            }
            if let Some(reason) = state.check_guard() {
                tracing::warn!(?reason, ?phase, steps, "turn halted by guard");
                self.store.save(thread_id, &state).await?;
                break reason;
            }
            if steps >= self.max_steps {
                state.error_message = Some(format!("Step limit of {} reached.", self.max_steps));
                continue;
            }
            steps += 1;

            let next = if phase == Phase::Reasoning {
                let reply = self.planner.plan(&state.messages).await?;
                let next = if reply.has_tool_calls() {
                    Phase::ToolExecution
                } else {
                    Phase::Halted
                };
                state.messages.push(reply);
                next
            } else {
                if let ActOutcome::Failed { index, error } =
                    execute_tool_calls(&self.executor, &mut state).await
                {
                    tracing::debug!(index, error = %error, "tool step failed");
                }
                Phase::Reasoning
            };
            tracing::debug!(step = steps, from = ?phase, to = ?next, "step complete");
            phase = next;

            self.store.save(thread_id, &state).await?;
            if phase == Phase::Halted {
                break HaltReason::Answered;
            }
        };

        let (prompt_tokens, completion_tokens, total_tokens) = self.planner.token_usage();
        tracing::info!(
            ?reason,
            steps,
            messages = state.messages.len(),
            prompt_tokens,
            completion_tokens,
            total_tokens,
            "turn finished"
        );
        Ok(TurnOutcome {
            final_content: state.final_content(),
            history: state.messages.messages().to_vec(),
            state,
            reason,
        })
    }
}
