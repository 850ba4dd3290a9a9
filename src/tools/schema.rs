//! 工具参数 JSON Schema 生成（schemars 自动生成，避免手写 schema 与参数结构体脱节）

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 由参数结构体生成模型可用的 parameters schema（去掉 $schema / title 元信息）
pub fn schema_of<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| {
        serde_json::json!({ "type": "object", "properties": {} })
    });
    if let Value::Object(map) = &mut value {
        map.remove("$schema");
        map.remove("title");
    }
    value
}

/// 将参数映射解析为具体参数结构体；失败信息直接作为工具错误返回给模型
pub fn parse_args<T: serde::de::DeserializeOwned>(
    args: serde_json::Map<String, Value>,
) -> Result<T, String> {
    serde_json::from_value(Value::Object(args)).map_err(|e| format!("Invalid arguments: {e}"))
}
