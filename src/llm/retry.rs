//! 适配层重试：对网络、超时、限流错误做指数退避重试
//!
//! 编排器每个推理步只发出一次逻辑调用，重试只发生在这一层。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{AssistantReply, LlmClient, LlmError, ToolSpec};
use crate::memory::Message;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次重试前的等待；限流时取服务端建议值与退避值中较大者
    fn delay_for(&self, attempt: u32, err: &LlmError) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        match err {
            LlmError::RateLimited { retry_after_ms } => {
                backoff.max(Duration::from_millis(*retry_after_ms).min(self.max_delay))
            }
            _ => backoff,
        }
    }
}

/// 带重试的推理后端包装
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn infer(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<AssistantReply, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.infer(system_prompt, messages, tools).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.delay_for(attempt, &e);
                    tracing::warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying LLM call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}
