//! Ollama 原生 API 网关
//!
//! POST {base}/api/chat（stream=false，附 tools 与 options.num_ctx）；GET {base}/api/tags 用于连通性与模型列表。
//! 图片附件挂在最后一条消息的 images 字段上。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{GatewayReply, ModelGateway};
use crate::memory::{Message, ToolCall};
use crate::tools::ToolDefinition;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    num_ctx: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct WireMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: WireMessage,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

fn to_wire(msg: &Message) -> WireMessage {
    WireMessage {
        role: msg.role.as_str().to_string(),
        content: msg.content.clone(),
        tool_calls: msg
            .tool_calls
            .iter()
            .map(|tc| WireToolCall {
                function: WireFunction {
                    name: tc.name.clone(),
                    arguments: tc.arguments.clone(),
                },
            })
            .collect(),
        tool_name: msg.name.clone(),
        images: Vec::new(),
    }
}

fn from_wire(msg: WireMessage) -> GatewayReply {
    let tool_calls = msg
        .tool_calls
        .into_iter()
        .map(|tc| ToolCall::new(tc.function.name, tc.function.arguments))
        .collect();
    GatewayReply::with_tool_calls(msg.content, tool_calls)
}

/// Ollama 网关：持有 HTTP 客户端、base_url、模型名与上下文长度
pub struct OllamaGateway {
    client: Client,
    base_url: String,
    model: String,
    num_ctx: u32,
}

impl OllamaGateway {
    pub fn new(base_url: Option<&str>, model: &str, num_ctx: u32, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url
                .unwrap_or(DEFAULT_OLLAMA_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            num_ctx,
        }
    }

    async fn tags(&self) -> Result<Vec<String>, reqwest::Error> {
        let resp: TagsResponse = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl ModelGateway for OllamaGateway {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        images: &[String],
    ) -> GatewayReply {
        let mut wire: Vec<WireMessage> = messages.iter().map(to_wire).collect();
        if let Some(last) = wire.last_mut() {
            last.images = images.to_vec();
        }
        let request = ChatRequest {
            model: &self.model,
            messages: wire,
            stream: false,
            tools: tools.filter(|t| !t.is_empty()),
            options: ChatOptions {
                num_ctx: self.num_ctx,
            },
        };

        let resp = match self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "ollama chat request failed");
                return GatewayReply::unreachable(e);
            }
        };

        match resp.json::<ChatResponse>().await {
            Ok(ChatResponse { error: Some(err), .. }) => GatewayReply::unreachable(err),
            Ok(body) => from_wire(body.message),
            Err(e) => {
                tracing::warn!(error = %e, "ollama chat response malformed");
                GatewayReply::unreachable(e)
            }
        }
    }

    async fn check_connection(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn list_models(&self) -> Vec<String> {
        self.tags().await.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_with_tool_calls() {
        let raw = json!({
            "model": "llama3.1:8b",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    { "function": { "name": "calculate", "arguments": { "expression": "2+2" } } }
                ]
            },
            "done": true
        });
        let body: ChatResponse = serde_json::from_value(raw).unwrap();
        let reply = from_wire(body.message);
        assert!(!reply.is_error());
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].name, "calculate");
        assert_eq!(reply.tool_calls[0].arguments["expression"], json!("2+2"));
    }

    #[test]
    fn test_request_serialization() {
        let call = ToolCall::new("echo", json!({"text": "oi"}));
        let messages = vec![
            Message::system("sys"),
            Message::assistant_with_tools("", vec![call.clone()]),
            Message::tool(&call, r#"{"success":true}"#),
        ];
        let wire: Vec<WireMessage> = messages.iter().map(to_wire).collect();
        let request = ChatRequest {
            model: "m",
            messages: wire,
            stream: false,
            tools: None,
            options: ChatOptions { num_ctx: 8192 },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stream"], json!(false));
        assert_eq!(value["options"]["num_ctx"], json!(8192));
        assert!(value.get("tools").is_none());
        assert_eq!(value["messages"][1]["tool_calls"][0]["function"]["name"], json!("echo"));
        assert_eq!(value["messages"][2]["role"], json!("tool"));
        assert_eq!(value["messages"][2]["tool_name"], json!("echo"));
        assert!(value["messages"][0].get("images").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_backend_becomes_error_reply() {
        // 端口 9 (discard) 一般无人监听，连接会被拒绝
        let gateway = OllamaGateway::new(Some("http://127.0.0.1:9"), "m", 2048, 2);
        let reply = gateway.chat(&[Message::user("oi")], None, &[]).await;
        assert!(reply.is_error());
        assert!(reply.content.starts_with("Erro ao conectar com o modelo"));
        assert!(!gateway.check_connection().await);
        assert!(gateway.list_models().await.is_empty());
    }
}
