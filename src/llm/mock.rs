//! Mock 推理后端（无需 API）
//!
//! MockLlmClient：收到用户消息时请求 echo 工具回显，收到工具结果后给出最终回复，便于本地跑通完整回合。
//! ScriptedLlmClient：按队列依次返回预置回复并记录每次请求，供测试使用。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{AssistantReply, LlmClient, LlmError, TokenUsage, ToolSpec};
use crate::memory::{Message, Role, ToolCallRequest};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn infer(
        &self,
        _system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<AssistantReply, LlmError> {
        let last = messages.last();
        match last {
            Some(m) if m.role == Role::Tool => {
                Ok(AssistantReply::text(format!("Echo from Mock: {}", m.content)))
            }
            Some(m) if m.role == Role::Human && tools.iter().any(|t| t.name == "echo") => {
                let call_id = format!("mock_call_{}", messages.len());
                Ok(AssistantReply::with_tool_calls(vec![ToolCallRequest::new(
                    call_id,
                    "echo",
                    serde_json::json!({ "text": m.content }),
                )]))
            }
            Some(m) => Ok(AssistantReply::text(format!("Echo from Mock: {}", m.content))),
            None => Ok(AssistantReply::text("(no input)")),
        }
    }
}

/// 一次被记录的推理请求
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// 脚本化客户端：依次弹出预置结果；队列耗尽时返回 InvalidResponse
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<AssistantReply, LlmError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    delay: Option<Duration>,
    per_call_usage: Option<(u64, u64)>,
    usage: TokenUsage,
}

impl ScriptedLlmClient {
    pub fn new(replies: impl IntoIterator<Item = Result<AssistantReply, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            delay: None,
            per_call_usage: None,
            usage: TokenUsage::new(),
        }
    }

    /// 每次调用前等待，模拟慢后端
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 每次调用计入的 token 数
    pub fn with_usage(mut self, prompt: u64, completion: u64) -> Self {
        self.per_call_usage = Some((prompt, completion));
        self
    }

    pub fn push_reply(&self, reply: Result<AssistantReply, LlmError>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(reply);
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn infer(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<AssistantReply, LlmError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if let Ok(mut reqs) = self.requests.lock() {
            reqs.push(RecordedRequest {
                system_prompt: system_prompt.to_string(),
                messages: messages.to_vec(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            });
        }
        if let Some((prompt, completion)) = self.per_call_usage {
            self.usage.add(prompt, completion);
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        next.unwrap_or_else(|| Err(LlmError::InvalidResponse("script exhausted".to_string())))
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}
