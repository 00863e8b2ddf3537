//! Analyst - Rust 数据分析智能体
//!
//! 模块划分：
//! - **agent**: 从配置装配编排器，分析请求服务
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 状态机编排、线程状态与守卫、线程监管、工具工作池
//! - **llm**: 推理后端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与重试
//! - **memory**: 对话记录与检查点持久化
//! - **react**: 推理步与工具执行步
//! - **tools**: 工具注册表与执行器（python_tool、echo）

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use agent::{AnalysisRequest, AnalysisResponse, AnalysisService};
pub use core::{AgentError, AgentState, HaltReason, Orchestrator, TurnOutcome};
