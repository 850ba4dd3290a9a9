//! open_program 工具：按名称或路径启动程序（不等待其退出）

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::process::Command;

use crate::tools::schema::{parse_args, schema_of};
use crate::tools::{Tool, ToolOutcome};

#[derive(Deserialize, JsonSchema)]
struct OpenArgs {
    /// Nome ou caminho do programa (ex: 'firefox', 'notepad', 'code')
    program: String,
    /// Argumentos opcionais passados ao programa
    #[serde(default)]
    args: Vec<String>,
}

/// 构造启动命令：Windows 走 cmd /C start，macOS 走 open -a，其余直接执行
fn launch_command(program: &str, args: &[String]) -> Command {
    if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", "", program]).args(args);
        c
    } else if cfg!(target_os = "macos") && !program.contains('/') {
        let mut c = Command::new("open");
        c.args(["-a", program]);
        if !args.is_empty() {
            c.arg("--args").args(args);
        }
        c
    } else {
        let mut c = Command::new(program);
        c.args(args);
        c
    }
}

pub struct OpenProgramTool;

#[async_trait]
impl Tool for OpenProgramTool {
    fn name(&self) -> &str {
        "open_program"
    }

    fn description(&self) -> &str {
        "Abre um programa ou aplicativo pelo nome ou caminho. Use para iniciar navegador, editor, terminal, etc."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<OpenArgs>()
    }

    async fn execute(&self, args: Map<String, Value>) -> ToolOutcome {
        let args: OpenArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::invalid_arguments(e),
        };
        let program = args.program.trim();
        if program.is_empty() {
            return ToolOutcome::invalid_arguments("Missing program");
        }
        tracing::info!(program = %program, "open_program tool execute");

        let mut cmd = launch_command(program, &args.args);
        cmd.stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        match cmd.spawn() {
            Ok(child) => ToolOutcome::ok(json!({
                "program": program,
                "pid": child.id(),
                "message": format!("{program} aberto"),
            })),
            Err(e) => ToolOutcome::failed(format!("Não foi possível abrir '{program}': {e}")),
        }
    }
}
