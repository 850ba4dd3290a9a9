//! DeskPilot - 本地大模型驱动的桌面助手
//!
//! 入口：初始化日志、创建后台会话，并运行标准输入 REPL。
//! 命令：/clear 清空对话，/status 查看状态，/quit 退出。

use std::path::PathBuf;

use anyhow::Context;
use deskpilot::core::create_agent;
use deskpilot::react::ReactEvent;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖；输出到 stderr，避免与回复混在一起
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let (agent, mut events) = create_agent(config_path)
        .await
        .context("Failed to create agent")?;

    // 过程事件：只展示工具相关的进度
    tokio::spawn(async move {
        while let Some(ev) = events.recv().await {
            match ev {
                ReactEvent::ToolCall { tool, .. } => eprintln!("  -> {tool}"),
                ReactEvent::Blocked { tool } => eprintln!("  !! {tool} bloqueado"),
                _ => {}
            }
        }
    });

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let reply = match input {
            "/quit" | "/exit" => break,
            "/clear" => agent.clear().await?,
            "/status" => serde_json::to_string_pretty(&agent.status().await?)?,
            _ => agent.submit(input).await?,
        };
        stdout.write_all(format!("{reply}\n").as_bytes()).await?;
    }

    agent.quit();
    Ok(())
}
