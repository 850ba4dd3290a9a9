//! 模型网关抽象
//!
//! 所有后端（Ollama / OpenAI 兼容 / Scripted）实现 ModelGateway：chat 发送有序消息与工具目录，
//! 返回结构化回复。网关失败不以 Err 形式出现，而是 error 字段非空的回复，由编排循环直接作为最终回答。

use async_trait::async_trait;

use crate::memory::{Message, ToolCall};
use crate::tools::ToolDefinition;

/// 网关回复：可见内容 + 原生工具调用；error 非空表示本轮失败
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub error: Option<String>,
}

impl GatewayReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            error: None,
        }
    }

    /// 失败回复：error 为技术细节，content 为给用户看的说明
    pub fn failure(error: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// 传输层错误的统一包装
    pub fn unreachable(error: impl std::fmt::Display) -> Self {
        Self::failure(
            error.to_string(),
            format!("Erro ao conectar com o modelo: {error}"),
        )
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// 模型网关 trait：只读共享，可被多个会话同时使用
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// 当前使用的模型名
    fn model_name(&self) -> &str;

    /// 发送消息列表（可选工具目录与图片附件），返回结构化回复
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        images: &[String],
    ) -> GatewayReply;

    /// 后端是否可达
    async fn check_connection(&self) -> bool;

    /// 后端可用模型列表；不可达时为空
    async fn list_models(&self) -> Vec<String>;
}

/// 工具调用参数的线上表示：对象原样保留，字符串交给编排循环解码
pub(crate) fn arguments_to_string(arguments: &serde_json::Value) -> String {
    match arguments {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}
