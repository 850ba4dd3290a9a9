//! 系统提示词与动态上下文
//!
//! 每轮处理前重新生成：内置（或文件覆盖的）基础提示词 + 当前时间、CPU、内存、工作目录、占用内存最多的进程。
//! 任何一项采集失败只会省略该项，不影响本轮。

use std::path::PathBuf;

use chrono::{DateTime, Local};
use sysinfo::{ProcessesToUpdate, System};
use tracing::warn;

use crate::config::AppSection;
use crate::memory::Message;

/// 展示的进程数
const TOP_PROCESSES: usize = 5;

const BUILTIN_PROMPT: &str = r#"Você é {name}, um assistente de desktop que controla o computador do usuário por meio de ferramentas.

## SUAS FERRAMENTAS
- **calculate**: contas matemáticas precisas. Nunca faça contas de cabeça.
- **open_program**: abre um programa.
- **type_into_application**: digita texto no programa que está em foco. Use SOMENTE para interagir com programas.
- **read_file** / **list_directory**: leitura de arquivos e pastas do espaço de trabalho.
- **run_command**: executa comandos de sistema permitidos.
- **fetch_webpage**: lê o conteúdo de uma página da web.

## REGRAS
1. **AÇÃO COMPLETA**: em tarefas com vários passos, conclua a tarefa inteira antes de responder.
2. **NUNCA PARE NO MEIO**: se uma ferramenta retornar sucesso e a tarefa não terminou, continue.
3. **COMUNICAÇÃO**: para falar com o usuário, apenas gere o texto da resposta. NUNCA use `type_into_application` para responder no chat.
4. **FORMATO**: NUNCA escreva JSON no texto da resposta. Use chamadas de função nativas.
5. **PERSEVERANÇA**: se uma ferramenta falhar, tente corrigir sozinho.
6. **REALIDADE**: nunca invente ferramentas.
7. **IDIOMA**: responda sempre em {language}.
"#;

/// 一次采集到的运行环境信息；None / 空表示未采集到
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub now: DateTime<Local>,
    pub cpu_percent: Option<f32>,
    /// (已用, 总量)，字节
    pub memory: Option<(u64, u64)>,
    pub current_dir: Option<PathBuf>,
    pub top_processes: Vec<String>,
}

type SystemSummary = (Option<f32>, Option<(u64, u64)>, Vec<String>);

/// CPU、内存与按内存占用排序的前几个进程名（去重）
fn summarize(sys: &System) -> SystemSummary {
    let cpu_percent = if sys.cpus().is_empty() {
        None
    } else {
        Some(sys.global_cpu_usage())
    };
    let memory = match sys.total_memory() {
        0 => None,
        total => Some((sys.used_memory(), total)),
    };

    let mut procs: Vec<(u64, String)> = sys
        .processes()
        .values()
        .map(|p| (p.memory(), p.name().to_string_lossy().into_owned()))
        .collect();
    procs.sort_by(|a, b| b.0.cmp(&a.0));
    let mut top_processes: Vec<String> = Vec::with_capacity(TOP_PROCESSES);
    for (_, name) in procs {
        if top_processes.len() == TOP_PROCESSES {
            break;
        }
        if !name.is_empty() && !top_processes.contains(&name) {
            top_processes.push(name);
        }
    }
    (cpu_percent, memory, top_processes)
}

impl ContextSnapshot {
    /// 采集当前环境；CPU 占用需要两次采样，中间等待 sysinfo 的最小间隔。
    /// sysinfo 的刷新是阻塞调用，放到 blocking 线程池执行；采样失败时相应字段为空
    pub async fn collect() -> Self {
        let first = tokio::task::spawn_blocking(|| {
            let mut sys = System::new();
            sys.refresh_cpu_usage();
            sys.refresh_memory();
            sys.refresh_processes(ProcessesToUpdate::All, true);
            sys
        })
        .await;

        let sys = match first {
            Ok(mut sys) => {
                tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
                tokio::task::spawn_blocking(move || {
                    sys.refresh_cpu_usage();
                    sys
                })
                .await
                .ok()
            }
            Err(e) => {
                warn!(error = %e, "system sampling failed");
                None
            }
        };

        let (cpu_percent, memory, top_processes) = match &sys {
            Some(sys) => summarize(sys),
            None => (None, None, Vec::new()),
        };

        Self {
            now: Local::now(),
            cpu_percent,
            memory,
            current_dir: std::env::current_dir().ok(),
            top_processes,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::from("## CONTEXTO ATUAL\n");
        out.push_str(&format!("- **Data**: {}\n", self.now.format("%d/%m/%Y (%A)")));
        out.push_str(&format!("- **Hora**: {}\n", self.now.format("%H:%M:%S")));
        if let Some(cpu) = self.cpu_percent {
            out.push_str(&format!("- **CPU**: {cpu:.1}% em uso\n"));
        }
        if let Some((used, total)) = self.memory {
            let gib = |b: u64| b as f64 / (1024.0 * 1024.0 * 1024.0);
            out.push_str(&format!(
                "- **RAM**: {:.1}GB / {:.1}GB\n",
                gib(used),
                gib(total)
            ));
        }
        if let Some(dir) = &self.current_dir {
            out.push_str(&format!("- **Diretório atual**: {}\n", dir.display()));
        }
        if !self.top_processes.is_empty() {
            out.push_str(&format!(
                "- **Processos ativos principais**: {}\n",
                self.top_processes.join(", ")
            ));
        }
        out
    }
}

/// 生成每轮的 system 消息
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    base: String,
    dynamic_context: bool,
}

impl PromptBuilder {
    /// 使用内置提示词
    pub fn new(name: &str, language: &str) -> Self {
        Self {
            base: BUILTIN_PROMPT
                .replace("{name}", name)
                .replace("{language}", language),
            dynamic_context: true,
        }
    }

    /// 按 [app] 配置构造；覆盖文件读取失败时记录警告并回退到内置提示词
    pub fn from_config(app: &AppSection) -> Self {
        let builder = Self::new(&app.name, &app.language);
        let Some(path) = &app.system_prompt_path else {
            return builder;
        };
        match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => builder.with_base(text),
            Ok(_) => {
                warn!(path = %path.display(), "system prompt file is empty, using built-in prompt");
                builder
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read system prompt file, using built-in prompt");
                builder
            }
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    /// 关闭动态上下文（测试或需要稳定提示词时）
    pub fn without_dynamic_context(mut self) -> Self {
        self.dynamic_context = false;
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub async fn system_message(&self) -> Message {
        if !self.dynamic_context {
            return Message::system(self.base.clone());
        }
        let snapshot = ContextSnapshot::collect().await;
        Message::system(format!("{}\n{}", self.base, snapshot.render()))
    }
}
