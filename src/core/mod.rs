//! 核心层：错误类型与后台会话编排

pub mod error;
pub mod orchestrator;

pub use error::{AgentError, RegistryError, ToolErrorKind};
pub use orchestrator::{create_agent, spawn_session, AgentHandle, Command, SessionStatus};
