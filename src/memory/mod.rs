//! 记忆层：单会话对话历史（只追加，仅在用户显式清空时重置）

pub mod conversation;

pub use conversation::{ConversationHistory, Message, Role, ToolCall};
