//! 工具执行器
//!
//! 持有只读 ToolRegistry、工作池与全局超时。invoke 按名称解析工具，在工作池中带超时执行，
//! 把未注册 / 工具返回错误 / 超时 / panic 统一映射为 ToolFailure；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use crate::core::{panic_message, TaskScheduler, ToolFailure};
use crate::memory::ToolCallRequest;
use crate::tools::ToolRegistry;

/// 工具执行器：一次调用 = 解析 + 工作池执行 + 超时 + 审计
#[derive(Clone)]
pub struct ToolExecutor {
    registry: ToolRegistry,
    scheduler: TaskScheduler,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, scheduler: TaskScheduler, timeout_secs: u64) -> Self {
        Self {
            registry,
            scheduler,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行一次工具调用；成功返回工具输出文本
    pub async fn invoke(&self, call: &ToolCallRequest) -> Result<String, ToolFailure> {
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| ToolFailure::NotFound(call.name.clone()))?;

        let start = Instant::now();
        let args = call.arguments.clone();
        let result = self
            .scheduler
            .run_tool(async move { tool.execute(args).await }, self.timeout)
            .await;

        let outcome = match result {
            Ok(Ok(Ok(content))) => Ok(content),
            Ok(Ok(Err(error))) => Err(ToolFailure::Failed {
                tool: call.name.clone(),
                error,
            }),
            Err(join_err) => Err(ToolFailure::Crashed(panic_message(join_err))),
            Ok(Err(_elapsed)) => Err(ToolFailure::Timeout {
                tool: call.name.clone(),
                secs: self.timeout.as_secs(),
            }),
        };

        let label = match &outcome {
            Ok(_) => "ok",
            Err(ToolFailure::Timeout { .. }) => "timeout",
            Err(ToolFailure::Crashed(_)) => "panic",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "call_id": call.id,
            "ok": outcome.is_ok(),
            "outcome": label,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.arguments),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        outcome
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
