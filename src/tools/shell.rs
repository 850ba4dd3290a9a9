//! 命令执行工具：白名单命令，禁止危险操作
//!
//! 仅允许配置中的命令名（首词，如 ls、grep、dir）；禁止 rm -rf、wget、chmod 777 等子串；
//! 拒绝一切 shell 元字符（; & | ` $ < > 括号与换行），因此只能运行单条命令。
//! Unix 下按空白切分后直接 exec，不经过 shell；Windows 下 dir / echo 等是 cmd 内建命令，仍经 cmd /C。
//! 带超时与 tracing 审计。

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::process::Command;

use crate::core::ToolErrorKind;
use crate::tools::schema::{parse_args, schema_of};
use crate::tools::{Tool, ToolOutcome};

/// 禁止的命令/子串（即使白名单中有同名，也不允许带这些参数）
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "rm -r",
    "wget ",
    "curl | sh",
    "chmod 777",
    "chmod +s",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    "format c:",
    ":(){ :|:& };:", // fork bomb
];

/// 可串联、重定向或替换命令的字符；出现任意一个即拒绝
const SHELL_METACHARS: &[char] = &[';', '&', '|', '`', '$', '<', '>', '(', ')', '\n', '\r', '^', '%'];

#[derive(Deserialize, JsonSchema)]
struct CommandArgs {
    /// Comando a executar (o primeiro termo precisa estar na lista permitida)
    command: String,
}

/// 命令工具：仅允许白名单内命令
pub struct ShellTool {
    allowed_commands: HashSet<String>,
    timeout_secs: u64,
}

impl ShellTool {
    pub fn new(allowed_commands: Vec<String>, timeout_secs: u64) -> Self {
        let allowed_commands = allowed_commands
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();
        Self {
            allowed_commands,
            timeout_secs,
        }
    }

    fn is_allowed(&self, raw: &str) -> Result<(), String> {
        if let Some(c) = raw.chars().find(|c| SHELL_METACHARS.contains(c)) {
            return Err(format!("Shell metacharacter {c:?} is not allowed"));
        }
        let raw_lower = raw.to_lowercase();
        if let Some(forbidden) = FORBIDDEN_SUBSTR.iter().find(|f| raw_lower.contains(*f)) {
            return Err(format!("Forbidden pattern: {forbidden}"));
        }
        let name = raw_lower.split_whitespace().next().unwrap_or("");
        if name.is_empty() {
            return Err("Empty command".to_string());
        }
        if self.allowed_commands.contains(name) {
            Ok(())
        } else {
            Err(format!("Command '{name}' not in allowlist"))
        }
    }
}

#[cfg(windows)]
fn build_command(command: &str) -> Command {
    let mut c = Command::new("cmd");
    c.args(["/C", command]);
    c
}

#[cfg(not(windows))]
fn build_command(command: &str) -> Command {
    let mut parts = command.split_whitespace();
    let mut c = Command::new(parts.next().unwrap_or_default());
    c.args(parts);
    c
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Executa um comando de terminal permitido (lista configurável) e retorna a saída."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<CommandArgs>()
    }

    async fn execute(&self, args: Map<String, Value>) -> ToolOutcome {
        let args: CommandArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::invalid_arguments(e),
        };
        let command = args.command.trim();
        if let Err(e) = self.is_allowed(command) {
            return ToolOutcome::error(ToolErrorKind::Blocked, e);
        }

        tracing::info!(command = %command, "run_command tool execute");

        let mut cmd = build_command(command);
        cmd.kill_on_drop(true);

        let output = match tokio::time::timeout(Duration::from_secs(self.timeout_secs), cmd.output()).await {
            Ok(Ok(o)) => o,
            Ok(Err(e)) => return ToolOutcome::failed(format!("Execution failed: {e}")),
            Err(_) => {
                return ToolOutcome::error(
                    ToolErrorKind::Timeout,
                    format!("Command timed out after {}s", self.timeout_secs),
                )
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return ToolOutcome::failed(format!("Exit {:?}\nstderr: {}", output.status.code(), stderr));
        }
        ToolOutcome::ok(json!({
            "command": command,
            "stdout": stdout,
            "stderr": stderr,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> ShellTool {
        ShellTool::new(vec!["echo".into(), "ls".into()], 5)
    }

    #[test]
    fn test_allowlist() {
        let t = tool();
        assert!(t.is_allowed("echo hi").is_ok());
        assert!(t.is_allowed("LS -la").is_ok());
        assert!(t.is_allowed("python -c 1").is_err());
        assert!(t.is_allowed("ls; rm -rf /").is_err());
        assert!(t.is_allowed("   ").is_err());
    }

    #[test]
    fn test_metacharacters_are_rejected() {
        let t = tool();
        for raw in [
            "echo hi; touch x",
            "echo hi && touch x",
            "echo hi | sh",
            "echo $(touch x)",
            "echo `touch x`",
            "echo hi > x",
            "echo hi\ntouch x",
            "ls & touch x",
        ] {
            assert!(t.is_allowed(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_chained_command_does_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        for raw in [
            format!("echo hi; touch {}", marker.display()),
            format!("echo hi && touch {}", marker.display()),
            format!("echo $(touch {})", marker.display()),
            format!("echo hi\ntouch {}", marker.display()),
        ] {
            let mut args = Map::new();
            args.insert("command".into(), json!(raw));
            let out = tool().execute(args).await.into_value();
            assert_eq!(out["error_kind"], json!("blocked"));
        }
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_blocked_command_is_structured() {
        let mut args = Map::new();
        args.insert("command".into(), json!("shutdown now"));
        let out = tool().execute(args).await.into_value();
        assert_eq!(out["success"], json!(false));
        assert_eq!(out["error_kind"], json!("blocked"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_allowed_command() {
        let mut args = Map::new();
        args.insert("command".into(), json!("echo deskpilot"));
        let out = tool().execute(args).await.into_value();
        assert_eq!(out["success"], json!(true));
        assert_eq!(out["stdout"], json!("deskpilot"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_arguments_are_passed_verbatim() {
        let mut args = Map::new();
        args.insert("command".into(), json!("echo *"));
        let out = tool().execute(args).await.into_value();
        assert_eq!(out["success"], json!(true));
        assert_eq!(out["stdout"], json!("*"));
    }
}
