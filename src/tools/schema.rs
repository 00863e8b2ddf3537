//! 工具参数 JSON Schema 生成（schemars）
//!
//! 强类型参数结构体派生 JsonSchema，即可作为 Tool::parameters_schema 的返回值。

use schemars::{gen::SchemaSettings, JsonSchema};
use serde_json::Value;

/// 生成参数 schema；去掉 `$schema` / `title` 等元信息，只保留 OpenAI function parameters 需要的部分
pub fn parameters_schema_for<T: JsonSchema>() -> Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let schema = settings.into_generator().into_root_schema_for::<T>();
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("title");
        obj.remove("$schema");
    }
    value
}
