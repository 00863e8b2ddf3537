//! OpenAI 兼容 API 客户端（含工具调用）
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。
//! 工具目录以 function tool 声明，响应中的 tool_calls 解析回 ToolCallRequest。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionTools,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    FunctionCall, FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{AssistantReply, LlmClient, LlmError, ToolSpec};
use crate::memory::{Message, Role, ToolCallRequest};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client 与 model 名
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        request_timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url.trim_end_matches('/'))
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            client: Client::with_config(config).with_http_client(http),
            model: model.to_string(),
            usage: TokenUsage::new(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// 组装请求：system 提示在最前，随后是完整对话记录；工具目录非空时声明 tools
    pub fn build_request(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let mut api_messages = Vec::with_capacity(messages.len() + 1);
        api_messages.push(ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()
                .map_err(map_openai_error)?,
        ));
        for m in messages {
            api_messages.push(to_openai_message(m)?);
        }

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(api_messages);
        if !tools.is_empty() {
            args.tools(
                tools
                    .iter()
                    .map(to_openai_tool)
                    .collect::<Result<Vec<_>, _>>()?,
            );
        }
        args.build().map_err(map_openai_error)
    }
}

fn to_openai_tool(spec: &ToolSpec) -> Result<ChatCompletionTools, LlmError> {
    let function = FunctionObjectArgs::default()
        .name(spec.name.clone())
        .description(spec.description.clone())
        .parameters(spec.parameters.clone())
        .build()
        .map_err(map_openai_error)?;
    Ok(ChatCompletionTools::Function(ChatCompletionTool { function }))
}

fn to_openai_message(m: &Message) -> Result<ChatCompletionRequestMessage, LlmError> {
    let message = match m.role {
        Role::System => ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(m.content.clone())
                .build()
                .map_err(map_openai_error)?,
        ),
        Role::Human => ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(m.content.clone())
                .build()
                .map_err(map_openai_error)?,
        ),
        Role::Tool => ChatCompletionRequestMessage::Tool(
            ChatCompletionRequestToolMessageArgs::default()
                .content(m.content.clone())
                .tool_call_id(m.tool_call_id.clone().unwrap_or_default())
                .build()
                .map_err(map_openai_error)?,
        ),
        Role::Assistant => {
            let mut args = ChatCompletionRequestAssistantMessageArgs::default();
            if !m.content.is_empty() || m.tool_calls.is_empty() {
                args.content(m.content.clone());
            }
            if !m.tool_calls.is_empty() {
                args.tool_calls(
                    m.tool_calls
                        .iter()
                        .map(|c| {
                            ChatCompletionMessageToolCalls::Function(ChatCompletionMessageToolCall {
                                id: c.id.clone(),
                                function: FunctionCall {
                                    name: c.name.clone(),
                                    arguments: match &c.arguments {
                                        Value::String(raw) => raw.clone(),
                                        other => other.to_string(),
                                    },
                                },
                            })
                        })
                        .collect::<Vec<_>>(),
                );
            }
            ChatCompletionRequestMessage::Assistant(args.build().map_err(map_openai_error)?)
        }
    };
    Ok(message)
}

/// 取首个 choice 转为 AssistantReply；无法解析的 arguments 保留为原始 JSON 字符串
fn reply_from_response(response: CreateChatCompletionResponse) -> Result<AssistantReply, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .filter_map(|call| match call {
            ChatCompletionMessageToolCalls::Function(c) => {
                let raw = c.function.arguments;
                let arguments = if raw.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
                };
                Some(ToolCallRequest::new(c.id, c.function.name, arguments))
            }
            other => {
                tracing::warn!(call = ?other, "ignoring non-function tool call");
                None
            }
        })
        .collect();

    Ok(AssistantReply {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
    })
}

/// OpenAIError → LlmError；限流按 API 错误码识别
fn map_openai_error(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::Reqwest(e) if e.is_timeout() => LlmError::Timeout,
        OpenAIError::Reqwest(e) => LlmError::Network(e.to_string()),
        OpenAIError::ApiError(api) => {
            let code = api.code.clone().unwrap_or_default();
            if code == "rate_limit_exceeded" || api.r#type.as_deref() == Some("rate_limit_exceeded")
            {
                LlmError::RateLimited {
                    retry_after_ms: 1000,
                }
            } else {
                LlmError::Api {
                    code,
                    message: api.message,
                }
            }
        }
        other => LlmError::InvalidResponse(other.to_string()),
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn infer(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<AssistantReply, LlmError> {
        let request = self.build_request(system_prompt, messages, tools)?;
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        // 提取 token 使用统计
        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let reply = reply_from_response(response)?;
        tracing::debug!(
            model = %self.model,
            tool_calls = reply.tool_calls.len(),
            "chat completion"
        );
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> OpenAiClient {
        OpenAiClient::new(Some("http://localhost:9/v1/"), "gpt-4o", Some("sk-test"), 5).unwrap()
    }

    #[test]
    fn test_request_prepends_system_and_declares_tools() {
        let c = client();
        let call = ToolCallRequest::new("call_1", "calc", json!({"expr": "2+2"}));
        let messages = vec![
            Message::human("2+2?"),
            Message::assistant_with_tool_calls("", vec![call]),
            Message::tool("4", "call_1"),
        ];
        let tools = vec![ToolSpec {
            name: "calc".to_string(),
            description: "Evaluate".to_string(),
            parameters: json!({"type": "object"}),
        }];
        let request = c.build_request("be terse", &messages, &tools).unwrap();
        let body = serde_json::to_value(&request).unwrap();

        let wire = body["messages"].as_array().unwrap();
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[1]["role"], "user");
        assert_eq!(wire[2]["role"], "assistant");
        assert_eq!(wire[2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            wire[2]["tool_calls"][0]["function"]["arguments"],
            "{\"expr\":\"2+2\"}"
        );
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "calc");
        assert_eq!(body["model"], "gpt-4o");
    }

    #[test]
    fn test_request_without_tools_omits_tools() {
        let request = client()
            .build_request("sys", &[Message::human("hi")], &[])
            .unwrap();
        assert!(request.tools.is_none());
    }

    fn response(message: Value) -> CreateChatCompletionResponse {
        serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o",
            "choices": [{"index": 0, "finish_reason": "tool_calls", "message": message}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        }))
        .unwrap()
    }

    #[test]
    fn test_tool_call_response_is_parsed() {
        let resp = response(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [
                {"id": "a", "type": "function", "function": {"name": "calc", "arguments": "{\"expr\":\"1\"}"}},
                {"id": "b", "type": "function", "function": {"name": "calc", "arguments": "not json"}}
            ]
        }));
        let reply = reply_from_response(resp).unwrap();
        assert_eq!(reply.content, "");
        assert_eq!(reply.tool_calls.len(), 2);
        assert_eq!(reply.tool_calls[0].arguments, json!({"expr": "1"}));
        assert_eq!(reply.tool_calls[1].arguments, json!("not json"));
    }

    #[test]
    fn test_text_response_is_parsed() {
        let reply = reply_from_response(response(json!({"role": "assistant", "content": "4"}))).unwrap();
        assert_eq!(reply.content, "4");
        assert!(reply.tool_calls.is_empty());
    }
}
