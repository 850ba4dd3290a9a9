//! 工具注册表
//!
//! 所有能力实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找。
//! execute 是能力代码与编排循环之间的故障隔离边界：找不到、返回错误、panic 都转为结构化结果，从不向上抛。

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::core::{RegistryError, ToolErrorKind};

/// 能力执行结果：显式成功 / 失败，失败带分类与信息
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// 成功：附带的字段合并进结果映射（非对象时放在 "result" 下）
    Success(Value),
    Failure { kind: ToolErrorKind, message: String },
}

impl ToolOutcome {
    pub fn ok(data: Value) -> Self {
        ToolOutcome::Success(data)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        ToolOutcome::Failure {
            kind: ToolErrorKind::ExecutionFailed,
            message: message.into(),
        }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        ToolOutcome::Failure {
            kind: ToolErrorKind::InvalidArguments,
            message: message.into(),
        }
    }

    pub fn error(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        ToolOutcome::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }

    /// 转为回灌给模型的结果映射：至少包含 success 字段
    pub fn into_value(self) -> Value {
        match self {
            ToolOutcome::Success(data) => {
                let mut map = match data {
                    Value::Object(m) => m,
                    Value::Null => Map::new(),
                    other => {
                        let mut m = Map::new();
                        m.insert("result".to_string(), other);
                        m
                    }
                };
                map.insert("success".to_string(), Value::Bool(true));
                Value::Object(map)
            }
            ToolOutcome::Failure { kind, message } => json!({
                "success": false,
                "error": message,
                "error_kind": kind.as_str(),
            }),
        }
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（全局唯一键）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema
    /// 默认返回空对象，表示无参数或参数格式不限
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 是否属于「向外部界面输入文本」类能力（受重复输出防护约束）
    fn is_text_entry(&self) -> bool {
        false
    }

    /// 执行工具
    async fn execute(&self, args: Map<String, Value>) -> ToolOutcome;
}

/// 能力描述（list 的返回值）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub text_entry: bool,
}

/// 导出给模型网关的工具定义：{"type": "function", "function": {...}}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 工具注册表：按名称存储 Arc<dyn Tool>（BTreeMap 保证导出顺序稳定）
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入或覆盖（后注册者生效），返回被替换的旧工具
    pub fn register(&mut self, tool: impl Tool + 'static) -> Option<Arc<dyn Tool>> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let name = tool.name().to_string();
        let previous = self.tools.insert(name.clone(), tool);
        if previous.is_some() {
            tracing::warn!(tool = %name, "tool re-registered, previous handler replaced");
        }
        previous
    }

    /// 严格注册：同名已存在时拒绝
    pub fn try_register(&mut self, tool: impl Tool + 'static) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.tools.insert(name, Arc::new(tool));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 所有已注册能力的描述
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
                text_entry: tool.is_text_entry(),
            })
            .collect()
    }

    /// 渲染为网关期望的工具定义列表
    pub fn export_schema(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                kind: "function".to_string(),
                function: FunctionDefinition {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameters_schema(),
                },
            })
            .collect()
    }

    pub fn is_text_entry(&self, name: &str) -> bool {
        self.tools
            .get(name)
            .map(|t| t.is_text_entry())
            .unwrap_or(false)
    }

    /// 执行工具；找不到或 handler panic 时返回结构化失败，永不 panic / 返回 Err
    pub async fn execute(&self, name: &str, args: Map<String, Value>) -> ToolOutcome {
        let Some(tool) = self.tools.get(name).cloned() else {
            return ToolOutcome::error(
                ToolErrorKind::NotFound,
                format!("Tool '{name}' not found"),
            );
        };

        match AssertUnwindSafe(tool.execute(args)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(tool = %name, reason = %reason, "tool handler panicked");
                ToolOutcome::error(
                    ToolErrorKind::Panicked,
                    format!("Tool execution failed: {reason}"),
                )
            }
        }
    }
}
