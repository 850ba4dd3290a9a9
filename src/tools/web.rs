//! fetch_webpage 工具：抓取网页正文，超时与结果大小限制
//!
//! 可选域名白名单（为空表示不限制）；GET 请求带超时与 User-Agent；
//! 对 HTML 响应使用 html2text 提取可读文本，超过 max_result_chars 时截断并追加 ...[truncated]。

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::core::ToolErrorKind;
use crate::tools::schema::{parse_args, schema_of};
use crate::tools::{Tool, ToolOutcome};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    let head: String = s.chars().take(512).collect::<String>().to_lowercase();
    head.starts_with("<!") || head.starts_with("<html") || head.contains("<head") || head.contains("<body")
}

/// 从 URL 中提取 host（小写，不含端口）
fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let host = rest.split('/').next()?.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_lowercase())
    }
}

#[derive(Deserialize, JsonSchema)]
struct FetchArgs {
    /// URL completa da página (http:// ou https://)
    url: String,
}

/// 抓取网页文本内容
pub struct FetchWebpageTool {
    client: Client,
    allowed_domains: HashSet<String>,
    max_result_chars: usize,
}

impl FetchWebpageTool {
    pub fn new(allowed_domains: Vec<String>, timeout_secs: u64, max_result_chars: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            allowed_domains: allowed_domains.into_iter().map(|d| d.to_lowercase()).collect(),
            max_result_chars,
        }
    }

    fn check_url(&self, url: &str) -> Result<String, ToolOutcome> {
        let domain = extract_domain(url)
            .ok_or_else(|| ToolOutcome::invalid_arguments("Invalid or missing URL"))?;
        if !self.allowed_domains.is_empty() && !self.allowed_domains.contains(&domain) {
            return Err(ToolOutcome::error(
                ToolErrorKind::Blocked,
                format!("Domain not in allowlist: {domain}"),
            ));
        }
        Ok(domain)
    }

    fn to_text(&self, body: &str) -> String {
        let body = body.trim_start_matches('\u{FEFF}');
        if !looks_like_html(body) {
            return body.to_string();
        }
        match from_read(body.as_bytes(), 120) {
            Ok(text) if !text.trim().is_empty() => text,
            _ => strip_html_tags(body),
        }
    }

    fn truncate(&self, text: String) -> (String, bool) {
        if text.chars().count() > self.max_result_chars {
            let cut: String = text.chars().take(self.max_result_chars).collect();
            (cut + "\n...[truncated]", true)
        } else {
            (text, false)
        }
    }
}

#[async_trait]
impl Tool for FetchWebpageTool {
    fn name(&self) -> &str {
        "fetch_webpage"
    }

    fn description(&self) -> &str {
        "Busca o conteúdo de texto de uma página web. Use para ler artigos, documentação, notícias, etc."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<FetchArgs>()
    }

    async fn execute(&self, args: Map<String, Value>) -> ToolOutcome {
        let args: FetchArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::invalid_arguments(e),
        };
        let url = args.url.trim();
        let domain = match self.check_url(url) {
            Ok(d) => d,
            Err(outcome) => return outcome,
        };
        tracing::info!(url = %url, domain = %domain, "fetch_webpage tool fetch");

        let resp = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return ToolOutcome::error(ToolErrorKind::Timeout, format!("Request timed out: {e}"))
            }
            Err(e) => return ToolOutcome::failed(format!("Request failed: {e}")),
        };
        let status = resp.status();
        if !status.is_success() {
            return ToolOutcome::failed(format!("HTTP {status}"));
        }
        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => return ToolOutcome::failed(format!("Read body: {e}")),
        };
        let (content, truncated) = self.truncate(self.to_text(&body));
        ToolOutcome::ok(json!({
            "url": url,
            "content": content,
            "truncated": truncated,
        }))
    }
}
