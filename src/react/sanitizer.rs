//! 响应净化
//!
//! 最终回复里可能泄漏工具结果 JSON（形如 `{"success": true, ...}`）。将其剥离：
//! 剩余文本足够长则保留；否则根据泄漏片段的 success 值给出标准的成功 / 失败提示。

use std::sync::OnceLock;

use regex::Regex;

use crate::config::AgentSection;
use crate::react::decoder::balanced_object;

pub const CANONICAL_SUCCESS: &str = "Pronto! A tarefa foi concluída com sucesso.";
pub const CANONICAL_FAILURE: &str =
    "Houve um problema ao executar a tarefa. Por favor, tente novamente.";

static LEAK_START_RE: OnceLock<Regex> = OnceLock::new();
static LEAK_LAZY_RE: OnceLock<Regex> = OnceLock::new();

fn leak_start_re() -> &'static Regex {
    LEAK_START_RE.get_or_init(|| {
        Regex::new(r#"(?is)\{\s*["']?success["']?\s*:\s*(true|false)"#).unwrap()
    })
}

fn leak_lazy_re() -> &'static Regex {
    LEAK_LAZY_RE.get_or_init(|| {
        Regex::new(r#"(?is)\{\s*["']?success["']?\s*:\s*(true|false).*?\}"#).unwrap()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseSanitizer {
    /// 剥离后剩余文本需超过此长度才作为最终回复
    pub min_chars: usize,
}

impl Default for ResponseSanitizer {
    fn default() -> Self {
        Self { min_chars: 10 }
    }
}

impl From<&AgentSection> for ResponseSanitizer {
    fn from(cfg: &AgentSection) -> Self {
        Self {
            min_chars: cfg.sanitizer_min_chars,
        }
    }
}

/// 单个泄漏片段在文本中的字节范围与 success 值
fn find_leak(text: &str) -> Option<(usize, usize, bool)> {
    let caps = leak_start_re().captures(text)?;
    let whole = caps.get(0)?;
    let success = caps
        .get(1)
        .map(|m| m.as_str().eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let start = whole.start();
    let end = match balanced_object(text, start) {
        Some(obj) => start + obj.len(),
        None => {
            let lazy = leak_lazy_re().find_at(text, start)?;
            lazy.end()
        }
    };
    Some((start, end, success))
}

impl ResponseSanitizer {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }

    /// 返回净化后的最终回复；没有泄漏时原样返回
    pub fn sanitize(&self, content: &str) -> String {
        let mut text = content.to_string();
        let mut leaked_success: Option<bool> = None;
        while let Some((start, end, success)) = find_leak(&text) {
            leaked_success.get_or_insert(success);
            text.replace_range(start..end, "");
        }
        let Some(success) = leaked_success else {
            return content.to_string();
        };

        let remaining = text.trim();
        if remaining.chars().count() > self.min_chars {
            remaining.to_string()
        } else if success {
            CANONICAL_SUCCESS.to_string()
        } else {
            CANONICAL_FAILURE.to_string()
        }
    }
}
