//! Python 代码执行工具（python_tool）
//!
//! 执行前检查 import 白名单；通过配置的解释器从 stdin 读入代码运行，带超时与 tracing 审计。
//! 非零退出码视为工具错误（返回 stderr），成功返回 stdout。

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::tools::schema::parameters_schema_for;
use crate::tools::Tool;

pub const PYTHON_TOOL_NAME: &str = "python_tool";

/// python_tool 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct PythonArgs {
    /// 要执行的 Python 代码
    pub code: String,
}

/// Python 执行工具
pub struct PythonTool {
    interpreter: String,
    authorized_imports: Vec<String>,
    timeout_secs: u64,
}

impl PythonTool {
    pub fn new(interpreter: impl Into<String>, authorized_imports: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            interpreter: interpreter.into(),
            authorized_imports,
            timeout_secs,
        }
    }

    /// 检查代码中的 import 语句；模块等于白名单项或为其子模块时放行
    pub fn check_imports(&self, code: &str) -> Result<(), String> {
        for module in imported_modules(code) {
            let allowed = self.authorized_imports.iter().any(|a| {
                module == *a || module.starts_with(&format!("{}.", a))
            });
            if !allowed {
                return Err(format!(
                    "Import of '{}' is not allowed. Authorized imports: {}",
                    module,
                    self.authorized_imports.join(", ")
                ));
            }
        }
        Ok(())
    }
}

/// 提取 `import a, b.c as d` 与 `from x.y import z` 中的模块名；相对导入原样返回（不会命中白名单）
fn imported_modules(code: &str) -> Vec<String> {
    let mut modules = Vec::new();
    for line in code.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("import ") {
            for part in rest.split(',') {
                if let Some(name) = part.split_whitespace().next() {
                    modules.push(name.trim_end_matches(';').to_string());
                }
            }
        } else if let Some(rest) = line.strip_prefix("from ") {
            if let Some(name) = rest.split_whitespace().next() {
                modules.push(name.to_string());
            }
        }
    }
    modules
}

#[async_trait]
impl Tool for PythonTool {
    fn name(&self) -> &str {
        PYTHON_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Execute Python code. Inputs: code (str)."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<PythonArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: PythonArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {}", e))?;
        self.check_imports(&args.code)?;

        tracing::info!(interpreter = %self.interpreter, code_len = args.code.len(), "python tool execute");

        let mut child = Command::new(&self.interpreter)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to start {}: {}", self.interpreter, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(args.code.as_bytes())
                .await
                .map_err(|e| format!("Failed to send code: {}", e))?;
        }

        let output = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| format!("Execution timed out after {}s", self.timeout_secs))?
        .map_err(|e| format!("Execution failed: {}", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(if stderr.is_empty() {
                format!("Exit {:?}", output.status.code())
            } else {
                stderr
            });
        }
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> PythonTool {
        PythonTool::new(
            "python3",
            vec!["pandas".to_string(), "matplotlib".to_string(), "math".to_string()],
            5,
        )
    }

    #[test]
    fn test_import_extraction() {
        let code = "import pandas as pd, math\nfrom matplotlib.pyplot import plot\nx = 1  # import os";
        assert_eq!(
            imported_modules(code),
            vec!["pandas", "math", "matplotlib.pyplot"]
        );
    }

    #[test]
    fn test_submodules_are_authorized() {
        assert!(tool().check_imports("import matplotlib.pyplot as plt").is_ok());
        assert!(tool().check_imports("from pandas import DataFrame").is_ok());
    }

    #[test]
    fn test_unauthorized_import_is_rejected() {
        let err = tool().check_imports("import os\nos.remove('x')").unwrap_err();
        assert!(err.contains("'os'"));
        assert!(tool().check_imports("import pandasx").is_err());
        assert!(tool().check_imports("from . import secret").is_err());
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_tool_errors() {
        let err = tool().execute(serde_json::json!({"source": "1"})).await.unwrap_err();
        assert!(err.starts_with("Invalid arguments"));
    }

    fn python3_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_stdout_is_the_result() {
        if !python3_available() {
            eprintln!("python3 not on PATH, skipping");
            return;
        }
        let out = tool()
            .execute(serde_json::json!({"code": "print(2+2)"}))
            .await
            .unwrap();
        assert_eq!(out, "4");
    }

    #[tokio::test]
    async fn test_exception_returns_stderr() {
        if !python3_available() {
            eprintln!("python3 not on PATH, skipping");
            return;
        }
        let err = tool()
            .execute(serde_json::json!({"code": "raise ValueError('x')"}))
            .await
            .unwrap_err();
        assert!(err.contains("Traceback"), "{err}");
        assert!(err.contains("ValueError: x"), "{err}");
    }

    #[tokio::test]
    async fn test_long_script_times_out() {
        if !python3_available() {
            eprintln!("python3 not on PATH, skipping");
            return;
        }
        let tool = PythonTool::new("python3", vec!["time".to_string()], 1);
        let err = tool
            .execute(serde_json::json!({"code": "import time\ntime.sleep(5)"}))
            .await
            .unwrap_err();
        assert_eq!(err, "Execution timed out after 1s");
    }

    #[test]
    fn test_schema_requires_code() {
        let schema = tool().parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["code"]));
    }
}
