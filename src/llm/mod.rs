//! 模型网关层：抽象与实现（Ollama / OpenAI 兼容 / Scripted）

pub mod mock;
pub mod ollama;
pub mod openai;
pub mod traits;

pub use mock::{RecordedRequest, ScriptedGateway};
pub use ollama::OllamaGateway;
pub use openai::OpenAiCompatGateway;
pub use traits::{GatewayReply, ModelGateway};
