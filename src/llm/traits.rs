//! 推理后端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient::infer：
//! 输入固定 system 提示、完整对话记录与工具目录，返回恰好一条 assistant 回复（可含工具调用）。

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::memory::{Message, ToolCallRequest};

/// 暴露给推理后端的工具目录条目
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// 参数 JSON Schema
    pub parameters: serde_json::Value,
}

/// 推理后端返回的 assistant 回复
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssistantReply {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: String::new(),
            tool_calls,
        }
    }

    pub fn into_message(self) -> Message {
        Message::assistant_with_tool_calls(self.content, self.tool_calls)
    }
}

/// 推理后端调用失败（网络、超时、限流、接口错误、响应无法解析）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited (retry after {retry_after_ms} ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// 适配层可重试的错误（网络、超时、限流）
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Network(_) | LlmError::Timeout | LlmError::RateLimited { .. }
        )
    }
}

/// 推理后端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn infer(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<AssistantReply, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
