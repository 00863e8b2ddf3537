//! LLM 层：推理后端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）及适配层重试

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT};
pub use mock::{MockLlmClient, RecordedRequest, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use retry::{RetryConfig, RetryingLlmClient};
pub use traits::{AssistantReply, LlmClient, LlmError, ToolSpec};
