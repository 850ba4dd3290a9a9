//! 编排主循环
//!
//! 用户消息 -> 拼 system(提示词 + 动态上下文) + 历史 -> 模型 -> {回复, 工具调用}
//! -> 可选自愈解码 -> 重复输出防护 -> 执行工具并回灌结果 -> 直到纯文本回复或达到迭代上限
//! -> 响应净化 -> 写入历史。
//!
//! 模型网关失败直接作为最终回复；其余失败（工具不存在、参数错误、panic、超时、拦截）
//! 都以结构化结果回灌给模型，由模型自行调整。达到上限不报错，返回最后观察到的内容。

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::llm::ModelGateway;
use crate::memory::{ConversationHistory, Message, ToolCall};
use crate::react::decoder::{self, looks_like_embedded_call};
use crate::react::guard::{refusal, DuplicateOutputGuard};
use crate::react::{PromptBuilder, ReactEvent, ResponseSanitizer};
use crate::tools::{ToolExecutor, ToolRegistry};

/// 默认迭代上限
pub const DEFAULT_MAX_ITERATIONS: usize = 15;
/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 解码工具调用参数：对象原样使用，字符串按 JSON 解析；失败或其他形态一律视为空参数
pub fn decode_arguments(raw: &Value) -> Map<String, Value> {
    match raw {
        Value::Object(map) => map.clone(),
        Value::String(s) if s.trim().is_empty() => Map::new(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => map,
            _ => {
                debug!(raw = %s, "tool arguments are not a JSON object, using empty arguments");
                Map::new()
            }
        },
        _ => Map::new(),
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!(
            "{}...",
            text.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>()
        )
    } else {
        text.to_string()
    }
}

/// 单个会话使用的编排器；网关与注册表为共享只读协作者
pub struct Orchestrator {
    gateway: Arc<dyn ModelGateway>,
    executor: ToolExecutor,
    guard: DuplicateOutputGuard,
    sanitizer: ResponseSanitizer,
    max_iterations: usize,
    prompt: PromptBuilder,
    event_tx: Option<mpsc::UnboundedSender<ReactEvent>>,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn ModelGateway>, executor: ToolExecutor) -> Self {
        Self {
            gateway,
            executor,
            guard: DuplicateOutputGuard::default(),
            sanitizer: ResponseSanitizer::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            prompt: PromptBuilder::new("JARVIS", "pt-BR"),
            event_tx: None,
        }
    }

    /// 按配置设置上限、防护与净化阈值、提示词
    pub fn from_config(
        gateway: Arc<dyn ModelGateway>,
        executor: ToolExecutor,
        cfg: &AppConfig,
    ) -> Self {
        Self::new(gateway, executor)
            .with_max_iterations(cfg.agent.max_iterations)
            .with_guard(DuplicateOutputGuard::from(&cfg.agent))
            .with_sanitizer(ResponseSanitizer::from(&cfg.agent))
            .with_prompt(PromptBuilder::from_config(&cfg.app))
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_guard(mut self, guard: DuplicateOutputGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: ResponseSanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_prompt(mut self, prompt: PromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn gateway(&self) -> &Arc<dyn ModelGateway> {
        &self.gateway
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.executor.registry()
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    fn emit(&self, ev: ReactEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }

    /// 处理一条用户消息，返回最终回复。用户消息与最终回复写入 history，中间轮次只存在于本次的工作列表
    pub async fn process_message(
        &self,
        history: &mut ConversationHistory,
        user_input: &str,
    ) -> String {
        self.process_message_with_images(history, user_input, &[]).await
    }

    /// 同 process_message，附带 base64 图片；图片只随第一次模型调用发送，之后的轮次以工具结果结尾
    pub async fn process_message_with_images(
        &self,
        history: &mut ConversationHistory,
        user_input: &str,
        images: &[String],
    ) -> String {
        history.push(Message::user(user_input));

        let mut working: Vec<Message> = Vec::with_capacity(history.len() + 1);
        working.push(self.prompt.system_message().await);
        working.extend_from_slice(history.messages());

        let tools = self.registry().export_schema();
        let mut iteration = 0usize;
        let mut last_content = String::new();

        loop {
            if iteration >= self.max_iterations {
                warn!(
                    max_iterations = self.max_iterations,
                    "iteration ceiling reached, returning last content"
                );
                break;
            }
            self.emit(ReactEvent::StepUpdate {
                step: iteration + 1,
                max_steps: self.max_iterations,
            });
            self.emit(ReactEvent::Thinking);
            debug!(iteration = iteration + 1, messages = working.len(), "calling model");

            let attached: &[String] = if iteration == 0 { images } else { &[] };
            let reply = self.gateway.chat(&working, Some(&tools), attached).await;
            if let Some(error) = reply.error {
                warn!(error = %error, "model gateway failed");
                self.emit(ReactEvent::Error { text: error.clone() });
                last_content = if reply.content.is_empty() {
                    error
                } else {
                    reply.content
                };
                break;
            }

            let mut content = reply.content;
            let mut calls = reply.tool_calls;

            if calls.is_empty() && looks_like_embedded_call(&content) {
                if let Some(healed) = decoder::decode(&content) {
                    info!(
                        tool = %healed.call.name,
                        cleared = healed.clear_content,
                        "recovered tool call from model text"
                    );
                    self.emit(ReactEvent::SelfHealed {
                        tool: healed.call.name.clone(),
                    });
                    if healed.clear_content {
                        content.clear();
                    }
                    calls.push(healed.call);
                }
            }

            last_content = content.clone();
            if calls.is_empty() {
                break;
            }

            for call in calls.iter_mut() {
                if call.id.is_none() {
                    call.id = Some(format!("call_{}", uuid::Uuid::new_v4().simple()));
                }
            }
            info!(
                iteration = iteration + 1,
                tools = ?calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                "model requested tools"
            );
            working.push(Message::assistant_with_tools(content.clone(), calls.clone()));

            for call in &calls {
                let result = self.dispatch(call, &content).await;
                working.push(Message::tool(call, result.to_string()));
            }

            iteration += 1;
        }

        let answer = self.sanitizer.sanitize(&last_content);
        if answer != last_content {
            info!("stripped leaked tool result from final answer");
        }
        history.push(Message::assistant(answer.clone()));
        self.emit(ReactEvent::MessageDone);
        answer
    }

    /// 执行单个调用：文本输入类能力先过重复输出防护
    async fn dispatch(&self, call: &ToolCall, spoken: &str) -> Value {
        let args = decode_arguments(&call.arguments);
        self.emit(ReactEvent::ToolCall {
            tool: call.name.clone(),
            args: Value::Object(args.clone()),
        });

        let result = if self.registry().is_text_entry(&call.name) && self.guard.check(&args, spoken)
        {
            warn!(tool = %call.name, "blocked typing of the spoken reply");
            self.emit(ReactEvent::Blocked {
                tool: call.name.clone(),
            });
            refusal()
        } else {
            self.executor.execute(&call.name, args).await
        };

        let success = result
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.emit(ReactEvent::Observation {
            tool: call.name.clone(),
            success,
            preview: preview(&result.to_string()),
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GatewayReply, ScriptedGateway};
    use crate::memory::Role;
    use crate::tools::EchoTool;
    use serde_json::json;

    fn orchestrator(gateway: Arc<ScriptedGateway>) -> Orchestrator {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let executor = ToolExecutor::new(Arc::new(registry), 5);
        Orchestrator::new(gateway, executor)
            .with_prompt(PromptBuilder::new("JARVIS", "pt-BR").without_dynamic_context())
    }

    #[test]
    fn test_decode_arguments() {
        assert_eq!(decode_arguments(&json!({"a": 1}))["a"], json!(1));
        assert_eq!(decode_arguments(&json!("{\"a\": 2}"))["a"], json!(2));
        assert!(decode_arguments(&json!("{not json")).is_empty());
        assert!(decode_arguments(&json!("[1, 2]")).is_empty());
        assert!(decode_arguments(&json!("")).is_empty());
        assert!(decode_arguments(&Value::Null).is_empty());
    }

    #[tokio::test]
    async fn test_plain_reply_is_final_answer() {
        let gateway = Arc::new(ScriptedGateway::new([GatewayReply::text("Olá!")]));
        let orch = orchestrator(gateway.clone());
        let mut history = ConversationHistory::new();

        let answer = orch.process_message(&mut history, "oi").await;
        assert_eq!(answer, "Olá!");
        assert_eq!(gateway.call_count(), 1);
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[0].role, Role::User);
        assert_eq!(history.messages()[1].content, "Olá!");
    }

    #[tokio::test]
    async fn test_working_list_layout() {
        let gateway = Arc::new(ScriptedGateway::new([
            GatewayReply::with_tool_calls(
                "",
                vec![ToolCall::new("echo", json!("{\"text\": \"ping\"}"))],
            ),
            GatewayReply::text("pong"),
        ]));
        let orch = orchestrator(gateway.clone());
        let mut history = ConversationHistory::new();
        history.push(Message::user("antes"));
        history.push(Message::assistant("ok"));

        let answer = orch.process_message(&mut history, "eco").await;
        assert_eq!(answer, "pong");

        let requests = gateway.requests();
        let first = &requests[0].messages;
        assert_eq!(first[0].role, Role::System);
        assert_eq!(first.len(), 4);
        assert_eq!(first[3].content, "eco");
        assert_eq!(requests[0].tool_count, 1);

        let second = &requests[1].messages;
        assert_eq!(second.len(), 6);
        assert_eq!(second[4].tool_calls.len(), 1);
        assert!(second[4].tool_calls[0].id.is_some());
        assert_eq!(second[5].role, Role::Tool);
        assert_eq!(second[5].tool_call_id, second[4].tool_calls[0].id);
        let result: Value = serde_json::from_str(&second[5].content).unwrap();
        assert_eq!(result["success"], json!(true));

        // 中间轮次不进入历史
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let gateway = Arc::new(ScriptedGateway::new([
            GatewayReply::with_tool_calls("", vec![ToolCall::new("echo", json!({"text": "x"}))]),
            GatewayReply::text("fim"),
        ]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orch = orchestrator(gateway).with_event_tx(tx);
        let mut history = ConversationHistory::new();
        orch.process_message(&mut history, "eco").await;
        drop(orch);

        let mut kinds = Vec::new();
        while let Some(ev) = rx.recv().await {
            kinds.push(serde_json::to_value(&ev).unwrap()["type"].as_str().unwrap().to_string());
        }
        assert!(kinds.contains(&"tool_call".to_string()));
        assert!(kinds.contains(&"observation".to_string()));
        assert_eq!(kinds.last().map(String::as_str), Some("message_done"));
    }
}
