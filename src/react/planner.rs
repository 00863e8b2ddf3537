//! Planner：推理步
//!
//! 以固定 system 提示 + 完整 MessageLog + 工具目录调用推理后端一次，返回恰好一条 assistant 消息。
//! 后端失败直接向上返回（致命），不在此处重试。

use std::sync::Arc;

use crate::llm::{LlmClient, LlmError, ToolSpec};
use crate::memory::{Message, MessageLog};

/// Planner：持有 LLM、system prompt 与启动时固定下来的工具目录
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    catalog: Vec<ToolSpec>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>, catalog: Vec<ToolSpec>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            catalog,
        }
    }

    /// 推理后端累计 token 使用：(prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 执行一次推理，返回待追加的 assistant 消息
    pub async fn plan(&self, log: &MessageLog) -> Result<Message, LlmError> {
        let reply = self
            .llm
            .infer(&self.system_prompt, log.messages(), &self.catalog)
            .await?;
        tracing::debug!(
            tool_calls = reply.tool_calls.len(),
            content_len = reply.content.len(),
            "reasoning step produced reply"
        );
        Ok(reply.into_message())
    }
}
