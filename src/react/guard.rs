//! 重复输出防护
//!
//! 常见失败模式：模型既在回复里说出答案，又命令文本输入工具把同一段文字敲进外部应用。
//! 仅对文本输入类能力生效：两段文本归一化后互为子串，且回复不超过输入文本长度的 ratio 倍时拦截。

use serde_json::{json, Map, Value};

use crate::config::AgentSection;
use crate::core::ToolErrorKind;

/// 拦截时回灌给模型的错误说明
pub const BLOCKED_MESSAGE: &str =
    "SEGURANÇA: Bloqueada tentativa de digitar a resposta do chat. Use o teclado APENAS para interagir com programas.";

/// 折叠空白并去掉首尾空白
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicateOutputGuard {
    /// 输入文本短于此长度不检查（短文本多为正常的界面输入）
    pub min_chars: usize,
    /// 回复长度 < ratio × 输入长度 时才视为重复（排除长回复中引用片段的情况）
    pub length_ratio: f64,
}

impl Default for DuplicateOutputGuard {
    fn default() -> Self {
        Self {
            min_chars: 50,
            length_ratio: 1.2,
        }
    }
}

impl From<&AgentSection> for DuplicateOutputGuard {
    fn from(cfg: &AgentSection) -> Self {
        Self {
            min_chars: cfg.guard_min_chars,
            length_ratio: cfg.guard_length_ratio,
        }
    }
}

impl DuplicateOutputGuard {
    /// typed 是准备输入的文本，spoken 是模型本轮的可见回复；返回 true 表示应拦截
    pub fn is_duplicate(&self, typed: &str, spoken: &str) -> bool {
        let typed = normalize(typed);
        let spoken = normalize(spoken);
        let typed_len = typed.chars().count();
        if typed_len <= self.min_chars || spoken.is_empty() {
            return false;
        }
        let overlaps = spoken.contains(typed.as_str()) || typed.contains(spoken.as_str());
        overlaps && (spoken.chars().count() as f64) < self.length_ratio * typed_len as f64
    }

    /// 针对一次调用的参数做检查；text 取自 "text" 参数
    pub fn check(&self, args: &Map<String, Value>, spoken: &str) -> bool {
        let typed = args.get("text").and_then(Value::as_str).unwrap_or("");
        self.is_duplicate(typed, spoken)
    }
}

/// 被拦截调用的结构化结果
pub fn refusal() -> Value {
    json!({
        "success": false,
        "blocked": true,
        "error": BLOCKED_MESSAGE,
        "error_kind": ToolErrorKind::Blocked.as_str(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long(text: &str) -> String {
        format!("{text} {}", "Resumo completo da reunião de hoje com todos os pontos.")
    }

    #[test]
    fn test_identical_text_is_blocked() {
        let guard = DuplicateOutputGuard::default();
        let text = long("Feito!");
        assert!(text.chars().count() > 50);
        assert!(guard.is_duplicate(&text, &text));
    }

    #[test]
    fn test_whitespace_differences_are_normalized() {
        let guard = DuplicateOutputGuard::default();
        let typed = long("Feito!");
        let spoken = typed.replace(' ', "\n  ");
        assert!(guard.is_duplicate(&typed, &spoken));
    }

    #[test]
    fn test_short_text_is_never_blocked() {
        let guard = DuplicateOutputGuard::default();
        assert!(!guard.is_duplicate("Feito!", "Feito!"));
        assert!(!guard.is_duplicate("python tutorial", "python tutorial"));
    }

    #[test]
    fn test_long_prose_quoting_text_is_allowed() {
        let guard = DuplicateOutputGuard::default();
        let typed = long("Olá");
        let spoken = format!(
            "Vou digitar o seguinte no editor: \"{typed}\". Depois disso salvo o arquivo e aviso você quando terminar."
        );
        assert!(!guard.is_duplicate(&typed, &spoken));
    }

    #[test]
    fn test_unrelated_text_is_allowed() {
        let guard = DuplicateOutputGuard::default();
        let typed = long("Carta");
        assert!(!guard.is_duplicate(&typed, "Pronto, digitei a carta no editor."));
        assert!(!guard.is_duplicate(&typed, ""));
    }

    #[test]
    fn test_check_reads_text_argument() {
        let guard = DuplicateOutputGuard::default();
        let text = long("Feito!");
        let mut args = Map::new();
        args.insert("text".into(), Value::String(text.clone()));
        assert!(guard.check(&args, &text));
        assert!(!guard.check(&Map::new(), &text));
    }

    #[test]
    fn test_refusal_shape() {
        let r = refusal();
        assert_eq!(r["success"], json!(false));
        assert_eq!(r["blocked"], json!(true));
        assert!(r["error"].as_str().unwrap().starts_with("SEGURANÇA"));
    }
}
