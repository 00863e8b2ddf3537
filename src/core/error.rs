//! 错误类型
//!
//! AgentError：致命错误，直接从 run_turn 返回（推理后端失败、检查点读写失败）。
//! ToolFailure：工具相关故障，只在工具执行步内部转为状态（error_message / tool_status），从不越过编排器边界。

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::CheckpointError;

/// run_turn 返回的致命错误；失败的那一步不会写入检查点
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Config error: {0}")]
    Config(String),
}

/// 单次工具调用的故障；Display 文本即写入 tool 消息与 error_message 的内容
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolFailure {
    #[error("Tool {0} not found.")]
    NotFound(String),

    #[error("Tool {tool} failed: {error}")]
    Failed { tool: String, error: String },

    #[error("Tool {tool} failed: timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    /// 工具内部 panic
    #[error("Tool execution failed: {0}")]
    Crashed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_failure_texts() {
        assert_eq!(
            ToolFailure::NotFound("plot3d".to_string()).to_string(),
            "Tool plot3d not found."
        );
        assert_eq!(
            ToolFailure::Failed {
                tool: "calc".to_string(),
                error: "division by zero".to_string()
            }
            .to_string(),
            "Tool calc failed: division by zero"
        );
        assert_eq!(
            ToolFailure::Timeout {
                tool: "python_tool".to_string(),
                secs: 5
            }
            .to_string(),
            "Tool python_tool failed: timed out after 5s"
        );
    }

    #[test]
    fn test_agent_error_from_llm() {
        let err: AgentError = LlmError::Timeout.into();
        assert!(matches!(err, AgentError::Llm(LlmError::Timeout)));
    }
}
