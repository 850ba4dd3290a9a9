//! Agent 编排器：后台会话任务
//!
//! 负责：加载配置、创建模型网关与工具集、建立命令 / 事件两条通道，
//! 并在后台任务中消费命令（Submit/Clear/Status/Quit），每条命令通过 oneshot 回复结果。

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::agent::{create_agent_components, Session};
use crate::config::{load_config, AppConfig, LlmSection};
use crate::core::AgentError;
use crate::llm::{ModelGateway, OllamaGateway, OpenAiCompatGateway, ScriptedGateway};
use crate::react::ReactEvent;

/// 前端发往后台会话的命令
#[derive(Debug)]
pub enum Command {
    /// 提交用户输入（可附带 base64 图片），回复最终答案
    Submit(String, Vec<String>, oneshot::Sender<String>),
    /// 清空对话历史，回复提示语
    Clear(oneshot::Sender<String>),
    /// 查询状态快照
    Status(oneshot::Sender<SessionStatus>),
    /// 结束后台任务
    Quit,
}

/// 会话状态快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub agent: String,
    pub gateway_connected: bool,
    pub model: String,
    pub model_available: bool,
    pub available_models: Vec<String>,
    pub tools_count: usize,
}

/// 根据 [llm] 配置选择模型网关（ollama / openai / mock）
pub fn create_gateway_from_config(
    llm: &LlmSection,
) -> Result<Arc<dyn ModelGateway>, AgentError> {
    match llm.provider.to_lowercase().as_str() {
        "ollama" => {
            tracing::info!(model = %llm.model, "Using Ollama gateway");
            Ok(Arc::new(OllamaGateway::new(
                llm.base_url.as_deref(),
                &llm.model,
                llm.num_ctx,
                llm.request_timeout_secs,
            )))
        }
        "openai" => {
            let base = llm.base_url.as_deref().ok_or_else(|| {
                AgentError::ConfigError("llm.base_url is required for the openai provider".into())
            })?;
            let api_key = llm
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
            tracing::info!(model = %llm.model, base = %base, "Using OpenAI-compatible gateway");
            Ok(Arc::new(OpenAiCompatGateway::new(
                base,
                &llm.model,
                api_key.as_deref(),
                llm.request_timeout_secs,
            )))
        }
        "mock" => {
            tracing::warn!("Using offline scripted gateway");
            Ok(Arc::new(ScriptedGateway::offline()))
        }
        other => Err(AgentError::ConfigError(format!(
            "unknown llm provider '{other}'"
        ))),
    }
}

/// 后台会话的句柄：把命令 + oneshot 包装成 async 方法
#[derive(Clone, Debug)]
pub struct AgentHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl AgentHandle {
    pub async fn submit(&self, input: impl Into<String>) -> Result<String, AgentError> {
        self.submit_with_images(input, Vec::new()).await
    }

    pub async fn submit_with_images(
        &self,
        input: impl Into<String>,
        images: Vec<String>,
    ) -> Result<String, AgentError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Submit(input.into(), images, reply_tx))?;
        reply_rx.await.map_err(|_| AgentError::ChannelClosed)
    }

    pub async fn clear(&self) -> Result<String, AgentError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Clear(reply_tx))?;
        reply_rx.await.map_err(|_| AgentError::ChannelClosed)
    }

    pub async fn status(&self) -> Result<SessionStatus, AgentError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Status(reply_tx))?;
        reply_rx.await.map_err(|_| AgentError::ChannelClosed)
    }

    pub fn quit(&self) {
        let _ = self.tx.send(Command::Quit);
    }

    fn send(&self, cmd: Command) -> Result<(), AgentError> {
        self.tx.send(cmd).map_err(|_| AgentError::ChannelClosed)
    }
}

/// 在后台任务中运行一个会话，直到收到 Quit 或所有句柄被丢弃
pub fn spawn_session(session: Session) -> AgentHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let mut session = session;

    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                Command::Submit(input, images, reply) => {
                    let answer = session.process_message_with_images(&input, &images).await;
                    let _ = reply.send(answer);
                }
                Command::Clear(reply) => {
                    let _ = reply.send(session.clear_history().to_string());
                }
                Command::Status(reply) => {
                    let _ = reply.send(session.status().await);
                }
                Command::Quit => break,
            }
        }
        tracing::debug!("session task finished");
    });

    AgentHandle { tx: cmd_tx }
}

/// 创建 Agent 运行时：返回命令句柄与过程事件接收端
pub async fn create_agent(
    config_path: Option<PathBuf>,
) -> anyhow::Result<(AgentHandle, mpsc::UnboundedReceiver<ReactEvent>)> {
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let components = create_agent_components(cfg)?;
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ReactEvent>();
    let session = components.session().with_event_tx(event_tx);

    Ok((spawn_session(session), event_rx))
}
