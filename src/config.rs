//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ANALYST__*` 覆盖（双下划线表示嵌套，如 `ANALYST__LLM__PROVIDER=mock`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub checkpoint: CheckpointSection,
}

/// [app] 段：步数上限、system 提示、上传目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 单轮最多执行的步数（推理步 + 工具步）
    pub max_steps: usize,
    /// system 提示文件；未设置或读取失败时使用内置提示
    pub system_prompt_path: Option<PathBuf>,
    /// 分析请求中 file_path 的查找目录
    pub upload_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            max_steps: crate::core::DEFAULT_MAX_STEPS,
            system_prompt_path: None,
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

/// [llm] 段：后端选择、重试与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / deepseek / mock；没有 API Key 时回退到 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 适配层重试次数（仅可重试错误）
    pub max_retries: u32,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            base_url: None,
            max_retries: 2,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [tools] 段：工具超时、并发上限、python_tool 设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 全进程同时运行的工具调用上限
    pub max_concurrent: usize,
    pub python: PythonSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 120,
            max_concurrent: 3,
            python: PythonSection::default(),
        }
    }
}

/// [tools.python] 段：解释器与允许导入的模块
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PythonSection {
    pub interpreter: String,
    pub authorized_imports: Vec<String>,
}

impl Default for PythonSection {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            authorized_imports: [
                "pandas",
                "numpy",
                "matplotlib",
                "seaborn",
                "scipy",
                "json",
                "math",
                "statistics",
                "datetime",
                "collections",
                "itertools",
                "re",
                "csv",
                "io",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// 检查点后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    Memory,
    File,
    Sqlite,
}

/// [checkpoint] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    pub backend: CheckpointBackend,
    /// file：目录；sqlite：数据库文件
    pub path: PathBuf,
    /// sqlite：每个线程保留的检查点行数
    pub keep_last: u32,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::Memory,
            path: PathBuf::from("data/checkpoints"),
            keep_last: 50,
        }
    }
}

/// 从 config 目录加载配置，环境变量 ANALYST__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ANALYST__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!("Config file {} not found, ignored", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ANALYST")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
