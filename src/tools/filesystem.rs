//! 沙箱文件系统工具
//!
//! SafeFs 绑定 root_dir，所有路径经 resolve 校验必须在 root 下（禁止 ../ 逃逸）；
//! ReadFileTool / ListDirectoryTool 基于 SafeFs 提供 read_file / list_directory 能力。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::tools::schema::{parse_args, schema_of};
use crate::tools::{Tool, ToolOutcome};

/// 单次读取的最大字符数，超出截断
const MAX_READ_CHARS: usize = 20_000;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("Path not found: {0}")]
    NotFound(String),
    #[error("Path escapes workspace: {0}")]
    Escape(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// 沙箱文件系统：绑定根目录，resolve 校验路径在根下，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    /// 检查路径是否在沙箱内
    pub fn resolve(&self, path: &str) -> Result<PathBuf, FsError> {
        let path = path.trim_start_matches("./");
        if path.is_empty() || path == "." {
            return Ok(self.root_dir.clone());
        }
        let canonical = self
            .root_dir
            .join(path)
            .canonicalize()
            .map_err(|_| FsError::NotFound(path.to_string()))?;
        if canonical.starts_with(&self.root_dir) {
            Ok(canonical)
        } else {
            Err(FsError::Escape(path.to_string())) // 如 ../../etc/passwd
        }
    }

    pub fn read_file(&self, path: &str) -> Result<String, FsError> {
        let resolved = self.resolve(path)?;
        Ok(std::fs::read_to_string(resolved)?)
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let base = self.resolve(path)?;
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&base)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let suffix = if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                "/"
            } else {
                ""
            };
            entries.push(format!("{name}{suffix}"));
        }
        entries.sort();
        Ok(entries)
    }
}

#[derive(Deserialize, JsonSchema)]
struct PathArgs {
    /// 相对于工作目录的路径
    #[serde(default)]
    path: String,
}

/// 读取文本文件
pub struct ReadFileTool {
    fs: SafeFs,
}

impl ReadFileTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Lê o conteúdo de um arquivo de texto dentro da pasta de trabalho."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<PathArgs>()
    }

    async fn execute(&self, args: Map<String, Value>) -> ToolOutcome {
        let args: PathArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::invalid_arguments(e),
        };
        tracing::info!(path = %args.path, "read_file tool execute");
        match self.fs.read_file(&args.path) {
            Ok(content) => {
                let truncated = content.chars().count() > MAX_READ_CHARS;
                let content: String = content.chars().take(MAX_READ_CHARS).collect();
                ToolOutcome::ok(json!({
                    "path": args.path,
                    "content": content,
                    "truncated": truncated,
                }))
            }
            Err(e) => ToolOutcome::failed(e.to_string()),
        }
    }
}

/// 列出目录
pub struct ListDirectoryTool {
    fs: SafeFs,
}

impl ListDirectoryTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "Lista o conteúdo de uma pasta dentro da pasta de trabalho (padrão: raiz)."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<PathArgs>()
    }

    async fn execute(&self, args: Map<String, Value>) -> ToolOutcome {
        let args: PathArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::invalid_arguments(e),
        };
        tracing::info!(path = %args.path, "list_directory tool execute");
        let shown = if args.path.is_empty() { "." } else { args.path.as_str() };
        match self.fs.list_dir(&args.path) {
            Ok(entries) => ToolOutcome::ok(json!({
                "path": shown,
                "count": entries.len(),
                "entries": entries,
            })),
            Err(e) => ToolOutcome::failed(e.to_string()),
        }
    }
}
