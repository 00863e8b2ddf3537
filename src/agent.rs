//! Headless 分析运行时
//!
//! 从配置装配 Orchestrator（推理后端 / 工具注册表 / 检查点后端），
//! 并提供 AnalysisService：把分析请求（问题 + 可选数据文件 + 可选起始代码）组合成一轮输入并执行。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, CheckpointBackend};
use crate::core::{AgentError, Orchestrator, TaskScheduler, TurnOutcome};
use crate::llm::{
    create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient, RetryConfig,
    RetryingLlmClient,
};
use crate::memory::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use crate::react::Planner;
use crate::tools::{EchoTool, PythonTool, ToolExecutor, ToolRegistry};

/// 未配置提示文件时使用的 system 提示
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a data analyst assistant. \
When a computation or a chart is needed, call python_tool with a complete Python script \
that loads the data from the given absolute path and prints the values you need. \
When you have enough information, answer in plain text without calling tools.";

/// 实际选用的推理后端
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    OpenAi,
    DeepSeek,
    Mock,
}

/// 根据 provider 与环境变量中的 API Key 选择后端；没有 Key 时回退到 Mock
pub fn select_backend(cfg: &AppConfig) -> Backend {
    let provider = cfg.llm.provider.to_lowercase();
    let has_deepseek_key = std::env::var("DEEPSEEK_API_KEY").is_ok();
    let has_openai_key = std::env::var("OPENAI_API_KEY").is_ok();

    match provider.as_str() {
        "mock" => Backend::Mock,
        "deepseek" if has_deepseek_key || has_openai_key => Backend::DeepSeek,
        "openai" if has_openai_key => Backend::OpenAi,
        _ => {
            tracing::warn!(provider = %provider, "No API key set or provider unknown, using Mock LLM");
            Backend::Mock
        }
    }
}

/// 创建推理后端；真实后端外层包一层适配层重试
pub fn create_llm(cfg: &AppConfig, backend: &Backend) -> anyhow::Result<Arc<dyn LlmClient>> {
    let timeout = cfg.llm.timeouts.request;
    let inner: Arc<dyn LlmClient> = match backend {
        Backend::Mock => return Ok(Arc::new(MockLlmClient)),
        Backend::DeepSeek => {
            tracing::info!("Using DeepSeek LLM ({})", cfg.llm.model);
            Arc::new(
                create_deepseek_client(Some(&cfg.llm.model), timeout)
                    .context("Failed to create DeepSeek client")?,
            )
        }
        Backend::OpenAi => {
            tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
            Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, None, timeout)
                    .context("Failed to create OpenAI client")?,
            )
        }
    };
    let retry = RetryConfig {
        max_retries: cfg.llm.max_retries,
        ..RetryConfig::default()
    };
    Ok(Arc::new(RetryingLlmClient::new(inner, retry)))
}

/// 构建工具注册表：python_tool 总是注册；Mock 后端额外注册 echo
pub fn create_tool_registry(cfg: &AppConfig, backend: &Backend) -> ToolRegistry {
    let python = &cfg.tools.python;
    let mut builder = ToolRegistry::builder().register(PythonTool::new(
        python.interpreter.clone(),
        python.authorized_imports.clone(),
        cfg.tools.tool_timeout_secs,
    ));
    if *backend == Backend::Mock {
        builder = builder.register(EchoTool);
    }
    builder.build()
}

/// 按 [checkpoint] 段创建检查点后端
pub async fn create_checkpoint_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn CheckpointStore>> {
    let path = &cfg.checkpoint.path;
    match cfg.checkpoint.backend {
        CheckpointBackend::Memory => Ok(Arc::new(MemoryCheckpointStore::new())),
        CheckpointBackend::File => {
            tracing::info!("Using file checkpoints at {}", path.display());
            Ok(Arc::new(FileCheckpointStore::new(path)))
        }
        #[cfg(feature = "async-sqlite")]
        CheckpointBackend::Sqlite => {
            tracing::info!("Using SQLite checkpoints at {}", path.display());
            let store = crate::memory::SqliteCheckpointStore::new(path)
                .await
                .context("Failed to open SQLite checkpoint store")?
                .with_retention(cfg.checkpoint.keep_last);
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "async-sqlite"))]
        CheckpointBackend::Sqlite => {
            anyhow::bail!("checkpoint backend 'sqlite' requires the async-sqlite feature")
        }
    }
}

/// 读取 system 提示：配置路径 → config/prompts/system.md → 内置提示
pub fn load_system_prompt(cfg: &AppConfig) -> String {
    let configured = cfg.app.system_prompt_path.iter().cloned();
    let fallbacks = ["config/prompts/system.md", "../config/prompts/system.md"]
        .into_iter()
        .map(PathBuf::from);
    configured
        .chain(fallbacks)
        .find_map(|p| std::fs::read_to_string(p).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
}

/// 从配置装配编排器
pub async fn create_orchestrator(cfg: &AppConfig) -> anyhow::Result<Orchestrator> {
    let backend = select_backend(cfg);
    let llm = create_llm(cfg, &backend)?;
    let registry = create_tool_registry(cfg, &backend);
    tracing::info!(tools = ?registry.tool_names(), "tool registry ready");

    let planner = Planner::new(llm, load_system_prompt(cfg), registry.catalog());
    let executor = ToolExecutor::new(
        registry,
        TaskScheduler::new(cfg.tools.max_concurrent),
        cfg.tools.tool_timeout_secs,
    );
    let store = create_checkpoint_store(cfg).await?;

    Ok(Orchestrator::new(planner, executor, store).with_max_steps(cfg.app.max_steps))
}

fn default_thread_id() -> String {
    "default".to_string()
}

/// 一次分析请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub query: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default = "default_thread_id")]
    pub thread_id: String,
}

impl AnalysisRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            file_path: None,
            code: None,
            thread_id: default_thread_id(),
        }
    }
}

/// 返回给调用方的单条消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub role: String,
    pub content: String,
}

/// 分析结果：最终回复与整条线程的消息记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub result: String,
    pub messages: Vec<MessageView>,
}

impl From<TurnOutcome> for AnalysisResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            result: outcome.final_content,
            messages: outcome
                .history
                .iter()
                .map(|m| MessageView {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
        }
    }
}

/// 组合一轮输入：数据文件存在于上传目录时加前缀，提供起始代码时加后缀
pub async fn compose_query(request: &AnalysisRequest, upload_dir: &Path) -> String {
    let mut query = request.query.clone();

    if let Some(name) = request.file_path.as_deref() {
        // 只取文件名，不允许跳出上传目录
        match Path::new(name).file_name() {
            Some(base) => match tokio::fs::canonicalize(upload_dir.join(base)).await {
                Ok(abs) if abs.is_file() => {
                    query = format!("Analyze the data from this file: {}\n\n{}", abs.display(), query);
                }
                _ => tracing::warn!(file = %name, "data file not found in upload dir, ignored"),
            },
            None => tracing::warn!(file = %name, "invalid data file name, ignored"),
        }
    }

    if let Some(code) = request.code.as_deref() {
        query = format!("{query}\n\nUse this code as a starting point:\n```python\n{code}\n```");
    }
    query
}

/// 分析服务：HTTP 等前端只需调用 analyze
pub struct AnalysisService {
    orchestrator: Arc<Orchestrator>,
    upload_dir: PathBuf,
}

impl AnalysisService {
    pub fn new(orchestrator: Arc<Orchestrator>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            orchestrator,
            upload_dir: upload_dir.into(),
        }
    }

    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let orchestrator = create_orchestrator(cfg).await?;
        Ok(Self::new(Arc::new(orchestrator), cfg.app.upload_dir.clone()))
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AgentError> {
        let query = compose_query(request, &self.upload_dir).await;
        let outcome = self
            .orchestrator
            .run_turn(&request.thread_id, &query, false)
            .await?;
        Ok(outcome.into())
    }
}
