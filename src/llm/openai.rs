//! OpenAI 兼容 API 网关
//!
//! POST {base}/v1/chat/completions，适用于 llama.cpp server、LM Studio、vLLM 以及 Ollama 的 /v1 端点；
//! 工具调用参数以 JSON 字符串返回，原样交给编排循环解码。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::llm::traits::arguments_to_string;
use crate::llm::{GatewayReply, ModelGateway};
use crate::memory::{Message, Role, ToolCall};
use crate::tools::ToolDefinition;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    /// 多数本地后端不接受 null content，统一发送字符串
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

fn to_wire(msg: &Message) -> WireMessage {
    WireMessage {
        role: msg.role.as_str(),
        content: msg.content.clone(),
        tool_calls: msg
            .tool_calls
            .iter()
            .map(|tc| WireToolCall {
                id: tc.id.clone(),
                kind: function_type(),
                function: WireFunction {
                    name: tc.name.clone(),
                    arguments: arguments_to_string(&tc.arguments),
                },
            })
            .collect(),
        tool_call_id: match msg.role {
            Role::Tool => msg.tool_call_id.clone(),
            _ => None,
        },
    }
}

fn from_wire(msg: ResponseMessage) -> GatewayReply {
    let tool_calls = msg
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let call = ToolCall::new(
                tc.function.name,
                serde_json::Value::String(tc.function.arguments),
            );
            match tc.id {
                Some(id) => call.with_id(id),
                None => call,
            }
        })
        .collect();
    GatewayReply::with_tool_calls(msg.content.unwrap_or_default(), tool_calls)
}

/// OpenAI 兼容网关：持有 HTTP 客户端、base_url、模型名与可选 API Key
pub struct OpenAiCompatGateway {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatGateway {
    pub fn new(base_url: &str, model: &str, api_key: Option<&str>, timeout_secs: u64) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').trim_end_matches("/v1").to_string(),
            model: model.to_string(),
            api_key,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self.client.get(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

#[async_trait]
impl ModelGateway for OpenAiCompatGateway {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        images: &[String],
    ) -> GatewayReply {
        if !images.is_empty() {
            tracing::debug!(count = images.len(), "image attachments ignored by OpenAI-compatible gateway");
        }
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: messages.iter().map(to_wire).collect(),
            stream: false,
            tools: tools.filter(|t| !t.is_empty()),
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = match builder.send().await.and_then(|r| r.error_for_status()) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "chat completion request failed");
                return GatewayReply::unreachable(e);
            }
        };

        match resp.json::<ChatCompletionResponse>().await {
            Ok(body) => match body.choices.into_iter().next() {
                Some(choice) => from_wire(choice.message),
                None => GatewayReply::unreachable("empty choices in completion response"),
            },
            Err(e) => {
                tracing::warn!(error = %e, "chat completion response malformed");
                GatewayReply::unreachable(e)
            }
        }
    }

    async fn check_connection(&self) -> bool {
        self.get("/v1/models")
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn list_models(&self) -> Vec<String> {
        let resp = match self.get("/v1/models").send().await.and_then(|r| r.error_for_status()) {
            Ok(r) => r,
            Err(_) => return Vec::new(),
        };
        resp.json::<ModelsResponse>()
            .await
            .map(|m| m.data.into_iter().map(|e| e.id).collect())
            .unwrap_or_default()
    }
}
