//! 脚本化网关（用于测试与离线模式，无需模型后端）
//!
//! 按顺序回放预设回复，用尽后重复最后一条；记录每次请求的消息列表与工具数量，便于断言。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{GatewayReply, ModelGateway};
use crate::memory::Message;
use crate::tools::ToolDefinition;

/// 一次 chat 调用的记录
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tool_count: usize,
    pub images: Vec<String>,
}

#[derive(Debug, Default)]
struct ScriptState {
    replies: VecDeque<GatewayReply>,
    last: Option<GatewayReply>,
    requests: Vec<RecordedRequest>,
}

/// 脚本化网关：回放 GatewayReply 队列
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    state: Mutex<ScriptState>,
    connected: bool,
}

impl ScriptedGateway {
    pub fn new(replies: impl IntoIterator<Item = GatewayReply>) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                replies: replies.into_iter().collect(),
                ..ScriptState::default()
            }),
            connected: true,
        }
    }

    /// 离线模式：对最后一条用户消息给出固定说明
    pub fn offline() -> Self {
        Self::new([GatewayReply::text(
            "Modo offline: nenhum modelo configurado. Configure [llm] em config/default.toml.",
        )])
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 已发生的调用次数
    pub fn call_count(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        images: &[String],
    ) -> GatewayReply {
        let mut state = self.lock();
        state.requests.push(RecordedRequest {
            messages: messages.to_vec(),
            tool_count: tools.map(|t| t.len()).unwrap_or(0),
            images: images.to_vec(),
        });
        match state.replies.pop_front() {
            Some(reply) => {
                state.last = Some(reply.clone());
                reply
            }
            None => state
                .last
                .clone()
                .unwrap_or_else(|| GatewayReply::failure("script exhausted", "")),
        }
    }

    async fn check_connection(&self) -> bool {
        self.connected
    }

    async fn list_models(&self) -> Vec<String> {
        if self.connected {
            vec!["scripted".to_string()]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_then_repeats_last() {
        let gateway = ScriptedGateway::new([GatewayReply::text("a"), GatewayReply::text("b")]);
        let msgs = [Message::user("oi")];
        assert_eq!(gateway.chat(&msgs, None, &[]).await.content, "a");
        assert_eq!(gateway.chat(&msgs, None, &[]).await.content, "b");
        assert_eq!(gateway.chat(&msgs, None, &[]).await.content, "b");
        assert_eq!(gateway.call_count(), 3);
        assert_eq!(gateway.requests()[0].messages[0].content, "oi");
    }

    #[tokio::test]
    async fn test_empty_script_is_error() {
        let gateway = ScriptedGateway::new([]);
        assert!(gateway.chat(&[], None, &[]).await.is_error());
    }
}
