//! 工具执行器
//!
//! 持有共享的 ToolRegistry 与全局超时，execute(tool_name, args) 在超时内调用 registry.execute，
//! 超时转为结构化 Timeout 结果；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::ToolErrorKind;
use crate::tools::{ToolOutcome, ToolRegistry};

/// 工具执行器：对每次调用施加超时；多个会话可共享同一个注册表
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// 执行指定工具，返回至少含 success 字段的结果映射；输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: Map<String, Value>) -> Value {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let outcome = match timeout(self.timeout, self.registry.execute(tool_name, args)).await {
            Ok(outcome) => outcome,
            Err(_) => ToolOutcome::error(
                ToolErrorKind::Timeout,
                format!(
                    "Tool '{}' timed out after {}s",
                    tool_name,
                    self.timeout.as_secs()
                ),
            ),
        };

        let outcome_label = match &outcome {
            ToolOutcome::Success(_) => "ok",
            ToolOutcome::Failure { kind, .. } => kind.as_str(),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": outcome.is_success(),
            "outcome": outcome_label,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        outcome.into_value()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;

    struct Sleepy;

    #[async_trait]
    impl Tool for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn description(&self) -> &str {
            "never finishes in time"
        }

        async fn execute(&self, _args: Map<String, Value>) -> ToolOutcome {
            tokio::time::sleep(Duration::from_secs(5)).await;
            ToolOutcome::ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_timeout_becomes_structured_error() {
        let mut registry = ToolRegistry::new();
        registry.register(Sleepy);
        let executor = ToolExecutor::new(Arc::new(registry), 30)
            .with_timeout(Duration::from_millis(20));

        let result = executor.execute("sleepy", Map::new()).await;
        assert_eq!(result["success"], Value::Bool(false));
        assert_eq!(result["error_kind"], Value::String("timeout".into()));
    }

    #[test]
    fn test_args_preview_truncates() {
        let mut args = Map::new();
        args.insert("text".into(), Value::String("x".repeat(500)));
        let preview = args_preview(&args);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 203);
    }
}
