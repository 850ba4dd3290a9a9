//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `DESKPILOT__*` 覆盖（双下划线表示嵌套，如 `DESKPILOT__LLM__MODEL=qwen2.5:7b`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
}

/// [app] 段：助手名、回复语言、可选的系统提示词文件
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub language: String,
    /// 覆盖内置系统提示词的文件路径
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "JARVIS".to_string(),
            language: "pt-BR".to_string(),
            system_prompt_path: None,
        }
    }
}

/// [llm] 段：后端选择、地址、模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：ollama / openai / mock
    pub provider: String,
    pub base_url: Option<String>,
    pub model: String,
    /// 未设置时回退到 OPENAI_API_KEY
    pub api_key: Option<String>,
    /// Ollama 上下文窗口
    pub num_ctx: u32,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: None,
            model: "llama3.1:8b".to_string(),
            api_key: None,
            num_ctx: 8192,
            request_timeout_secs: 120,
        }
    }
}

/// [agent] 段：迭代上限与防护 / 净化阈值
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 单条用户消息内模型往返次数上限
    pub max_iterations: usize,
    /// 输入文本短于此长度时不做重复输出检查
    pub guard_min_chars: usize,
    /// 回复长度 / 输入文本长度 低于此比例才视为重复
    pub guard_length_ratio: f64,
    /// 净化后剩余文本超过此长度才保留
    pub sanitizer_min_chars: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            guard_min_chars: 50,
            guard_length_ratio: 1.2,
            sanitizer_min_chars: 10,
        }
    }
}

/// [tools] 段：工作目录、工具超时、命令白名单、网页抓取、键盘输入
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 文件工具的沙箱根目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub shell: ShellSection,
    pub web: WebSection,
    pub keyboard: KeyboardSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            workspace_root: None,
            tool_timeout_secs: 30,
            shell: ShellSection::default(),
            web: WebSection::default(),
            keyboard: KeyboardSection::default(),
        }
    }
}

/// [tools.shell] 段：允许执行的命令名（仅首词）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellSection {
    pub allowed_commands: Vec<String>,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            allowed_commands: ["ls", "dir", "echo", "date", "whoami", "hostname", "uptime", "df", "free", "ping"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// [tools.web] 段：抓取网页的超时、最大字符数、可选域名白名单（空 = 不限制）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub timeout_secs: u64,
    pub max_result_chars: usize,
    pub allowed_domains: Vec<String>,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_result_chars: 8000,
            allowed_domains: Vec::new(),
        }
    }
}

/// [tools.keyboard] 段：逐字输入间隔
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeyboardSection {
    pub typing_delay_ms: u64,
}

impl Default for KeyboardSection {
    fn default() -> Self {
        Self { typing_delay_ms: 12 }
    }
}

/// 从 config 目录加载配置，环境变量 DESKPILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 DESKPILOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    if let Some(name) = default_names
        .into_iter()
        .find(|name| std::path::Path::new(&format!("{name}.toml")).exists())
    {
        builder = builder.add_source(config::File::with_name(name).required(false));
    }

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("DESKPILOT")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
