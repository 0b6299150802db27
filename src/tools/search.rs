//! Web 搜索工具：可插拔后端、空查询拦截、无结果哨兵、结果截断
//!
//! 后端故障一律转为描述性字符串返回，搜索失败永远不会中断推理循环。
//! 默认后端抓取 DuckDuckGo HTML 结果页，用 html2text 提取标题与摘要。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;

use crate::tools::registry::string_arg;
use crate::tools::Tool;

pub const SEARCH_TOOL_NAME: &str = "web_search";

/// 后端“无结果”哨兵文本
pub const NO_RESULTS_SENTINEL: &str = "No good DuckDuckGo Search Result was found";

/// 默认截断长度（字符）
pub const DEFAULT_MAX_RESULT_CHARS: usize = 3000;

const TRUNCATION_MARKER: &str = "\n\n... (results truncated for brevity)";

/// 搜索后端：返回结果文本；无结果时返回空串或包含 NO_RESULTS_SENTINEL 的文本
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str) -> Result<String, String>;
}

/// Web 搜索工具：参数 {"query": "..."}
pub struct WebSearchTool {
    backend: Arc<dyn SearchBackend>,
    max_result_chars: usize,
}

impl WebSearchTool {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            backend,
            max_result_chars: DEFAULT_MAX_RESULT_CHARS,
        }
    }

    pub fn with_max_result_chars(mut self, max: usize) -> Self {
        self.max_result_chars = max;
        self
    }

    /// 执行搜索；任何结果（包括失败）都以字符串返回
    pub async fn search(&self, query: &str) -> String {
        let query = query.trim();
        if query.is_empty() {
            return "Error: Empty search query provided".to_string();
        }
        tracing::info!(query = %query, "web search");

        match self.backend.search(query).await {
            Ok(results) if results.trim().is_empty() || results.contains(NO_RESULTS_SENTINEL) => {
                format!("No results found for query: {}", query)
            }
            Ok(results) => truncate_chars(&results, self.max_result_chars),
            Err(e) => {
                tracing::error!(query = %query, error = %e, "web search failed");
                format!(
                    "Failed to perform web search for query: {}. Error: {}",
                    query, e
                )
            }
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        text.chars().take(max).collect::<String>() + TRUNCATION_MARKER
    } else {
        text.to_string()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        SEARCH_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Perform a web search for the given query and return the results. Useful for finding real-time information, documentation, or answers to specific questions."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query string"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        Ok(self.search(string_arg(&args, "query")).await)
    }
}

static RESULT_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn result_pattern() -> Option<&'static Regex> {
    RESULT_PATTERN
        .get_or_init(|| {
            Regex::new(
                r#"(?s)class="result__a"[^>]*>(.*?)</a>.*?class="result__snippet"[^>]*>(.*?)</a>"#,
            )
            .ok()
        })
        .as_ref()
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 将 HTML 片段转为单行纯文本
fn fragment_to_text(fragment: &str) -> String {
    let text = match from_read(fragment.as_bytes(), 400) {
        Ok(text) if !text.trim().is_empty() => text,
        _ => strip_html_tags(fragment),
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 从 DuckDuckGo HTML 结果页提取 "标题: 摘要" 列表
pub fn parse_duckduckgo_html(html: &str, max_results: usize) -> Vec<String> {
    let Some(re) = result_pattern() else {
        return Vec::new();
    };
    re.captures_iter(html)
        .filter_map(|c| {
            let title = fragment_to_text(c.get(1)?.as_str());
            let snippet = fragment_to_text(c.get(2)?.as_str());
            if title.is_empty() && snippet.is_empty() {
                None
            } else {
                Some(format!("{}: {}", title, snippet))
            }
        })
        .take(max_results)
        .collect()
}

/// DuckDuckGo HTML 后端
pub struct DuckDuckGoBackend {
    client: Client,
    endpoint: String,
    max_results: usize,
}

impl DuckDuckGoBackend {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64, max_results: usize) -> Self {
        const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            max_results,
        }
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoBackend {
    async fn search(&self, query: &str) -> Result<String, String> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body = resp.text().await.map_err(|e| format!("Read body: {}", e))?;

        let results = parse_duckduckgo_html(&body, self.max_results);
        if results.is_empty() {
            return Ok(NO_RESULTS_SENTINEL.to_string());
        }
        Ok(results.join("\n"))
    }
}
