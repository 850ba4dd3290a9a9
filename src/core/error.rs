//! 错误类型
//!
//! - AgentError：运行时构造 / 会话通道层面的错误（不会出现在单条消息的处理路径上）
//! - ToolErrorKind：能力执行失败的分类，由 ToolRegistry 在边界处一次性转换为结构化结果
//! - RegistryError：注册冲突（try_register）

use serde::Serialize;
use thiserror::Error;

/// Agent 运行过程中可能出现的错误
///
/// 注意：模型网关失败不在此列，它会作为本轮最终回复直接返回给用户。
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// 后台会话任务已退出，命令无法送达
    #[error("Agent channel closed")]
    ChannelClosed,
}

/// 工具失败分类（随结构化结果一起回灌给模型）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    NotFound,
    InvalidArguments,
    ExecutionFailed,
    Timeout,
    Panicked,
    Blocked,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::NotFound => "not_found",
            ToolErrorKind::InvalidArguments => "invalid_arguments",
            ToolErrorKind::ExecutionFailed => "execution_failed",
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::Panicked => "panicked",
            ToolErrorKind::Blocked => "blocked",
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Tool '{0}' is already registered")]
    Duplicate(String),
}
