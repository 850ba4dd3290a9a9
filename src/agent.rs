//! Headless Agent 运行时
//!
//! 供非交互前端（REPL、HTTP、WebSocket 等）调用的无界面 Agent 逻辑：
//! create_agent_components 按配置构建共享的工具注册表与模型网关，
//! Session 持有单个会话的历史，process_message 对单条用户输入跑编排循环并返回最终回复。
//! 多个 Session 可并发运行，只共享只读的注册表与网关。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::core::orchestrator::{create_gateway_from_config, SessionStatus};
use crate::core::{AgentError, RegistryError};
use crate::llm::ModelGateway;
use crate::memory::ConversationHistory;
use crate::react::{Orchestrator, ReactEvent};
use crate::tools::{
    CalculatorTool, EchoTool, FetchWebpageTool, ListDirectoryTool, OpenProgramTool, ReadFileTool,
    ShellTool, ToolExecutor, ToolRegistry, TypeTextTool,
};

/// 清空历史后的提示语
pub const CLEARED_MESSAGE: &str = "Conversa limpa. Como posso ajudar?";

/// 预构建的 Agent 组件：配置、工具注册表、模型网关，可多会话共享
#[derive(Clone)]
pub struct AgentComponents {
    pub config: AppConfig,
    pub registry: Arc<ToolRegistry>,
    pub gateway: Arc<dyn ModelGateway>,
}

/// 工作目录：配置 > 当前目录下的 workspace
fn resolve_workspace(cfg: &AppConfig) -> PathBuf {
    cfg.tools.workspace_root.clone().unwrap_or_else(|| {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("workspace")
    })
}

/// 内置能力集合；同名重复注册视为构造错误
pub fn builtin_registry(cfg: &AppConfig, workspace: &Path) -> Result<ToolRegistry, RegistryError> {
    let tools = &cfg.tools;
    let mut registry = ToolRegistry::new();
    registry.try_register(CalculatorTool)?;
    registry.try_register(EchoTool)?;
    registry.try_register(ReadFileTool::new(workspace))?;
    registry.try_register(ListDirectoryTool::new(workspace))?;
    registry.try_register(ShellTool::new(
        tools.shell.allowed_commands.clone(),
        tools.tool_timeout_secs,
    ))?;
    registry.try_register(FetchWebpageTool::new(
        tools.web.allowed_domains.clone(),
        tools.web.timeout_secs,
        tools.web.max_result_chars,
    ))?;
    registry.try_register(OpenProgramTool)?;
    registry.try_register(TypeTextTool::new(tools.keyboard.typing_delay_ms))?;
    Ok(registry)
}

/// 创建 Agent 组件：按配置选择网关、注册内置工具
pub fn create_agent_components(cfg: AppConfig) -> Result<AgentComponents, AgentError> {
    let workspace = resolve_workspace(&cfg);
    if let Err(e) = std::fs::create_dir_all(&workspace) {
        tracing::warn!(path = %workspace.display(), error = %e, "failed to create workspace");
    }

    let gateway = create_gateway_from_config(&cfg.llm)?;
    let registry = builtin_registry(&cfg, &workspace)?;
    tracing::info!(
        tools = registry.len(),
        workspace = %workspace.display(),
        "agent components ready"
    );

    Ok(AgentComponents {
        config: cfg,
        registry: Arc::new(registry),
        gateway,
    })
}

impl AgentComponents {
    pub fn new(config: AppConfig, registry: Arc<ToolRegistry>, gateway: Arc<dyn ModelGateway>) -> Self {
        Self {
            config,
            registry,
            gateway,
        }
    }

    /// 新建一个独立会话（空历史）
    pub fn session(&self) -> Session {
        let executor = ToolExecutor::new(self.registry.clone(), self.config.tools.tool_timeout_secs);
        let orchestrator = Orchestrator::from_config(self.gateway.clone(), executor, &self.config);
        Session::new(self.config.app.name.clone(), orchestrator)
    }
}

/// 单个会话：独占自己的对话历史
pub struct Session {
    agent_name: String,
    history: ConversationHistory,
    orchestrator: Orchestrator,
}

impl Session {
    pub fn new(agent_name: impl Into<String>, orchestrator: Orchestrator) -> Self {
        Self {
            agent_name: agent_name.into(),
            history: ConversationHistory::new(),
            orchestrator,
        }
    }

    pub fn with_event_tx(self, tx: mpsc::UnboundedSender<ReactEvent>) -> Self {
        Self {
            orchestrator: self.orchestrator.with_event_tx(tx),
            ..self
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// 处理单条用户消息，返回最终回复文本
    pub async fn process_message(&mut self, user_input: &str) -> String {
        self.orchestrator
            .process_message(&mut self.history, user_input)
            .await
    }

    /// 附带图片（base64）的用户消息
    pub async fn process_message_with_images(&mut self, user_input: &str, images: &[String]) -> String {
        self.orchestrator
            .process_message_with_images(&mut self.history, user_input, images)
            .await
    }

    /// 清空对话历史；注册表与网关不受影响
    pub fn clear_history(&mut self) -> &'static str {
        self.history.clear();
        tracing::info!("conversation cleared");
        CLEARED_MESSAGE
    }

    pub async fn status(&self) -> SessionStatus {
        let gateway = self.orchestrator.gateway();
        let gateway_connected = gateway.check_connection().await;
        let available_models = if gateway_connected {
            gateway.list_models().await
        } else {
            Vec::new()
        };
        let model = gateway.model_name().to_string();
        let model_available = available_models.iter().any(|m| m.contains(&model));

        SessionStatus {
            agent: self.agent_name.clone(),
            gateway_connected,
            model,
            model_available,
            available_models,
            tools_count: self.orchestrator.registry().len(),
        }
    }
}
