//! 编排层：提示词、自愈解码、重复输出防护、响应净化、主循环

pub mod decoder;
pub mod events;
pub mod guard;
pub mod loop_;
pub mod prompt;
pub mod sanitizer;

pub use decoder::{decode, looks_like_embedded_call, HealedCall};
pub use events::ReactEvent;
pub use guard::DuplicateOutputGuard;
pub use loop_::{decode_arguments, Orchestrator, DEFAULT_MAX_ITERATIONS};
pub use prompt::{ContextSnapshot, PromptBuilder};
pub use sanitizer::{ResponseSanitizer, CANONICAL_FAILURE, CANONICAL_SUCCESS};
