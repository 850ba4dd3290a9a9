//! DeskPilot - 本地大模型驱动的桌面助手
//!
//! 模块划分：
//! - **agent**: 无头会话运行时（AgentComponents / Session）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、后台会话任务与命令通道
//! - **llm**: 模型网关抽象与实现（Ollama / OpenAI 兼容 / Scripted）
//! - **memory**: 会话历史
//! - **react**: 提示词、自愈解码、重复输出防护、响应净化、编排主循环
//! - **tools**: 工具注册表、执行器与内置工具

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod react;
pub mod tools;
