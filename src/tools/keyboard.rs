//! type_into_application 工具：向当前聚焦的外部应用输入文本
//!
//! Linux 使用 xdotool，macOS 使用 osascript（System Events），Windows 使用 PowerShell SendKeys。
//! 属于「文本输入」类能力，编排循环在分发前会经过重复输出防护。

use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::process::Command;

use crate::core::ToolErrorKind;
use crate::tools::schema::{parse_args, schema_of};
use crate::tools::{Tool, ToolOutcome};

const TYPE_TIMEOUT_SECS: u64 = 60;

#[derive(Deserialize, JsonSchema)]
struct TypeArgs {
    /// Texto a digitar no aplicativo em foco
    text: String,
}

/// SendKeys 中有特殊含义的字符需用花括号转义
fn escape_sendkeys(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '+' | '^' | '%' | '~' | '(' | ')' | '{' | '}' | '[' | ']' => {
                out.push('{');
                out.push(c);
                out.push('}');
            }
            '\'' => out.push_str("''"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// 按平台构造输入命令：返回 (程序, 参数)
fn typing_command(text: &str, delay_ms: u64) -> (String, Vec<String>) {
    if cfg!(target_os = "windows") {
        let script = format!(
            "Add-Type -AssemblyName System.Windows.Forms; [System.Windows.Forms.SendKeys]::SendWait('{}')",
            escape_sendkeys(text)
        );
        ("powershell".into(), vec!["-NoProfile".into(), "-Command".into(), script])
    } else if cfg!(target_os = "macos") {
        let script = format!(
            "tell application \"System Events\" to keystroke \"{}\"",
            escape_applescript(text)
        );
        ("osascript".into(), vec!["-e".into(), script])
    } else {
        (
            "xdotool".into(),
            vec![
                "type".into(),
                "--delay".into(),
                delay_ms.to_string(),
                "--".into(),
                text.to_string(),
            ],
        )
    }
}

pub struct TypeTextTool {
    delay_ms: u64,
}

impl TypeTextTool {
    pub fn new(delay_ms: u64) -> Self {
        Self { delay_ms }
    }
}

#[async_trait]
impl Tool for TypeTextTool {
    fn name(&self) -> &str {
        "type_into_application"
    }

    fn description(&self) -> &str {
        "Digita texto em um aplicativo externo (editor, navegador). Suporta acentos. NÃO use para responder ao usuário no chat."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<TypeArgs>()
    }

    fn is_text_entry(&self) -> bool {
        true
    }

    async fn execute(&self, args: Map<String, Value>) -> ToolOutcome {
        let args: TypeArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::invalid_arguments(e),
        };
        if args.text.is_empty() {
            return ToolOutcome::invalid_arguments("Missing text");
        }
        let (program, argv) = typing_command(&args.text, self.delay_ms);
        tracing::info!(program = %program, chars = args.text.chars().count(), "type_into_application execute");

        let mut cmd = Command::new(&program);
        cmd.args(&argv).kill_on_drop(true);
        let output = match tokio::time::timeout(Duration::from_secs(TYPE_TIMEOUT_SECS), cmd.output()).await {
            Ok(Ok(o)) => o,
            Ok(Err(e)) => return ToolOutcome::failed(format!("{program} indisponível: {e}")),
            Err(_) => {
                return ToolOutcome::error(
                    ToolErrorKind::Timeout,
                    format!("Typing timed out after {TYPE_TIMEOUT_SECS}s"),
                )
            }
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return ToolOutcome::failed(format!("{program} falhou: {}", stderr.trim()));
        }
        ToolOutcome::ok(json!({
            "typed_chars": args.text.chars().count(),
            "message": "Texto digitado",
        }))
    }
}
