//! 工具执行步
//!
//! 按顺序执行最近一条 assistant 消息中的工具调用，结果以 tool 消息按同一顺序追加。
//! 遇到第一个故障（未注册 / 工具错误 / 超时 / panic）即停止：追加该调用的错误结果，
//! 设置 tool_status 与 error_message，同批次后续调用不再尝试。

use crate::core::{AgentState, ToolStatus};
use crate::memory::Message;
use crate::tools::ToolExecutor;

/// 一次工具执行步的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActOutcome {
    /// 全部成功，回到推理
    Completed { executed: usize },
    /// 第 index 个调用失败，error_message 已设置
    Failed { index: usize, error: String },
}

/// 执行一批工具调用，原地更新状态
pub async fn execute_tool_calls(executor: &ToolExecutor, state: &mut AgentState) -> ActOutcome {
    let calls = state
        .messages
        .last()
        .filter(|m| m.has_tool_calls())
        .map(|m| m.tool_calls.clone())
        .unwrap_or_default();

    for (index, call) in calls.iter().enumerate() {
        match executor.invoke(call).await {
            Ok(content) => {
                state.messages.push(Message::tool(content, call.id.clone()));
            }
            Err(failure) => {
                let error = failure.to_string();
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %error, "tool batch aborted");
                state.messages.push(Message::tool(error.clone(), call.id.clone()));
                state.tool_status = Some(ToolStatus::Error {
                    error: error.clone(),
                });
                state.error_message = Some(error.clone());
                return ActOutcome::Failed { index, error };
            }
        }
    }

    state.tool_status = Some(ToolStatus::Success);
    ActOutcome::Completed {
        executed: calls.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TaskScheduler;
    use crate::memory::{Role, ToolCallRequest};
    use crate::tools::{EchoTool, ToolRegistry};
    use serde_json::json;

    fn executor() -> ToolExecutor {
        ToolExecutor::new(
            ToolRegistry::builder().register(EchoTool).build(),
            TaskScheduler::default(),
            5,
        )
    }

    fn state_with_calls(calls: Vec<ToolCallRequest>) -> AgentState {
        let mut state = AgentState::default();
        state.begin_turn("go", false);
        state
            .messages
            .push(Message::assistant_with_tool_calls("", calls));
        state
    }

    #[tokio::test]
    async fn test_all_calls_succeed_in_order() {
        let mut state = state_with_calls(vec![
            ToolCallRequest::new("a", "echo", json!({"text": "first"})),
            ToolCallRequest::new("b", "echo", json!({"text": "second"})),
        ]);
        let outcome = execute_tool_calls(&executor(), &mut state).await;
        assert_eq!(outcome, ActOutcome::Completed { executed: 2 });
        assert_eq!(state.tool_status, Some(ToolStatus::Success));
        assert!(state.error_message.is_none());

        let tail: Vec<(Option<String>, String)> = state.messages.messages()[2..]
            .iter()
            .map(|m| (m.tool_call_id.clone(), m.content.clone()))
            .collect();
        assert_eq!(
            tail,
            vec![
                (Some("a".to_string()), "first".to_string()),
                (Some("b".to_string()), "second".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_stops_batch() {
        let mut state = state_with_calls(vec![
            ToolCallRequest::new("a", "plot3d", json!({})),
            ToolCallRequest::new("b", "echo", json!({"text": "never"})),
        ]);
        let outcome = execute_tool_calls(&executor(), &mut state).await;
        assert_eq!(
            outcome,
            ActOutcome::Failed {
                index: 0,
                error: "Tool plot3d not found.".to_string()
            }
        );
        assert_eq!(state.messages.len(), 3);
        let last = state.messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("a"));
        assert_eq!(state.error_message.as_deref(), Some("Tool plot3d not found."));
        assert_eq!(
            state.tool_status,
            Some(ToolStatus::Error {
                error: "Tool plot3d not found.".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_no_pending_calls_is_noop_success() {
        let mut state = AgentState::default();
        state.begin_turn("hi", false);
        let outcome = execute_tool_calls(&executor(), &mut state).await;
        assert_eq!(outcome, ActOutcome::Completed { executed: 0 });
        assert_eq!(state.messages.len(), 1);
    }
}
