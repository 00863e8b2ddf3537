//! 线程状态：AgentState（按线程持久化的单元）、状态机阶段与入口守卫
//!
//! AgentState 只由 Orchestrator 的各步修改；每步结束后整体写入 CheckpointStore。

use serde::{Deserialize, Serialize};

use crate::memory::{Message, MessageLog};

/// 用户主动停止时追加的 assistant 文本
pub const STOPPED_MESSAGE: &str = "Process stopped by user.";

/// 最近一批工具调用的结果摘要（每次工具执行步覆盖）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error { error: String },
}

/// 每个线程持久化的完整状态
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub messages: MessageLog,
    #[serde(default)]
    pub tool_status: Option<ToolStatus>,
    /// 粘性错误：一旦设置，下一次入口守卫即终止本轮
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub stop_requested: bool,
}

/// 状态机阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Phase {
    Reasoning,
    ToolExecution,
    Halted,
}

/// 本轮结束原因
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    /// 推理后端给出了不含工具调用的回答
    Answered,
    Stopped,
    Errored,
}

impl AgentState {
    /// 开始新一轮：追加用户输入，用调用方的 stop 覆盖 stop_requested，并清空上一轮的信号字段
    pub fn begin_turn(&mut self, user_input: &str, stop: bool) {
        self.messages.push(Message::human(user_input));
        self.stop_requested = stop;
        self.error_message = None;
        self.tool_status = None;
    }

    /// 入口守卫（每个节点执行前检查）：stop 优先于 error。
    /// 命中时追加解释性 assistant 消息并返回终止原因。
    pub fn check_guard(&mut self) -> Option<HaltReason> {
        if self.stop_requested {
            self.messages.push(Message::assistant(STOPPED_MESSAGE));
            return Some(HaltReason::Stopped);
        }
        if let Some(err) = &self.error_message {
            let text = format!("Error occurred: {}", err);
            self.messages.push(Message::assistant(text));
            return Some(HaltReason::Errored);
        }
        None
    }

    /// 最后一条消息的内容（用作本轮最终回复）
    pub fn final_content(&self) -> String {
        self.messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}
