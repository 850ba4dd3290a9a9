//! 自愈解码器
//!
//! 模型没有返回原生 tool call，但在文本里漏出了 `{"name": ..., "parameters": {...}}` 时，
//! 从文本中恢复出一个工具调用。触发条件见 [`looks_like_embedded_call`]；解析失败时不做任何改动。

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::memory::ToolCall;

/// 可见文本比提取出的 JSON 长不超过这么多字符时，视为纯泄漏并清空
const LEAK_SLACK_CHARS: usize = 20;

static CALL_START_RE: OnceLock<Regex> = OnceLock::new();

fn call_start_re() -> &'static Regex {
    CALL_START_RE.get_or_init(|| Regex::new(r#"\{\s*"name"\s*:\s*""#).unwrap())
}

/// 从文本中恢复出的调用
#[derive(Debug, Clone, PartialEq)]
pub struct HealedCall {
    pub call: ToolCall,
    /// 可见内容几乎只有这段 JSON，应当清空
    pub clear_content: bool,
}

#[derive(Deserialize)]
struct EmbeddedCall {
    name: String,
    #[serde(alias = "arguments")]
    parameters: Value,
}

/// 触发启发式：同时包含花括号与 name 键
pub fn looks_like_embedded_call(content: &str) -> bool {
    content.contains('{') && content.contains("name")
}

/// 从 start（指向 '{'）开始做括号配对，跳过字符串内的括号，返回完整对象切片
pub(crate) fn balanced_object(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 尝试从文本恢复一个工具调用；依次尝试每个候选对象，第一个严格解析成功的生效
pub fn decode(content: &str) -> Option<HealedCall> {
    for m in call_start_re().find_iter(content) {
        let Some(candidate) = balanced_object(content, m.start()) else {
            continue;
        };
        let Ok(embedded) = serde_json::from_str::<EmbeddedCall>(candidate) else {
            continue;
        };
        if embedded.name.trim().is_empty() {
            continue;
        }
        let clear_content =
            content.trim().chars().count() < candidate.chars().count() + LEAK_SLACK_CHARS;
        return Some(HealedCall {
            call: ToolCall::new(embedded.name.trim(), embedded.parameters),
            clear_content,
        });
    }
    None
}
