//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute）。
//! 启动时通过 ToolRegistryBuilder 一次性注册，build 之后只读，可在多线程间共享。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::ToolSpec;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
///
/// execute 的 Err 为结构化的工具错误文本；工具内部 panic 由 ToolExecutor 捕获并转为错误。
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema，默认不限参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 启动期构建器
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistryBuilder {
    /// 同名工具后注册者覆盖先注册者
    pub fn register(mut self, tool: impl Tool + 'static) -> Self {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Arc::new(tool)).is_some() {
            tracing::warn!(tool = %name, "tool registered twice, keeping the latest");
        }
        self
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            tools: Arc::new(self.tools),
        }
    }
}

/// 只读工具注册表（克隆开销为一次 Arc 计数）
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<BTreeMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// 按名称排序
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 供推理后端使用的工具目录（按名称排序）
    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|(name, tool)| ToolSpec {
                name: name.clone(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "named"
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_catalog_is_sorted_and_complete() {
        let registry = ToolRegistry::builder()
            .register(Named("zeta"))
            .register(EchoTool)
            .register(Named("alpha"))
            .build();

        let names: Vec<String> = registry.catalog().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha", "echo", "zeta"]);
        assert_eq!(registry.len(), 3);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("plot3d").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_registration_keeps_latest() {
        struct Other;
        #[async_trait]
        impl Tool for Other {
            fn name(&self) -> &str {
                "alpha"
            }
            fn description(&self) -> &str {
                "other"
            }
            async fn execute(&self, _args: Value) -> Result<String, String> {
                Ok("other".to_string())
            }
        }

        let registry = ToolRegistry::builder()
            .register(Named("alpha"))
            .register(Other)
            .build();
        let tool = registry.get("alpha").unwrap();
        assert_eq!(tool.execute(Value::Null).await.unwrap(), "other");
    }
}
