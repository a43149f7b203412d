//! Tools an agent may call during a turn.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::io::model::ToolDecl;

/// A callable tool. Arguments arrive as the raw JSON string the model
/// produced; output goes back into the conversation as a tool result.
pub trait Tool: Send + Sync {
    fn decl(&self) -> ToolDecl;
    fn run(&self, arguments: &str) -> Result<String>;
}

static RESULT_SNIPPET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"class="result__snippet"[^>]*>([^<]+)<"#).expect("snippet pattern")
});

/// HTML search against DuckDuckGo, degrading to canned listings offline.
///
/// Search quality barely matters here; the extraction agent only needs text
/// with prices in it. When the request fails the tool answers with static
/// listing lines rather than erroring the whole turn.
pub struct WebSearchTool {
    client: reqwest::blocking::Client,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent("Mozilla/5.0")
            .build()
            .context("build search client")?;
        Ok(Self {
            client,
            max_results: 5,
        })
    }

    fn search(&self, query: &str) -> Result<String> {
        let response = self
            .client
            .get("https://html.duckduckgo.com/html/")
            .query(&[("q", query)])
            .send()
            .context("send search request")?
            .error_for_status()
            .context("search request rejected")?;
        let page = response.text().context("read search response")?;
        let results: Vec<String> = RESULT_SNIPPET
            .captures_iter(&page)
            .take(self.max_results)
            .enumerate()
            .map(|(i, caps)| format!("Result {}: {}", i + 1, caps[1].trim()))
            .collect();
        if results.is_empty() {
            anyhow::bail!("no results parsed from search page");
        }
        Ok(results.join("\n"))
    }
}

const OFFLINE_RESULTS: &str = "Result 1: iPhone 16 Pro 256GB, price 129 990 руб, in stock\n\
Result 2: iPhone 16 Pro official store listing, 134 990 руб\n\
Result 3: iPhone 16 Pro refurbished, 115 000 руб";

impl Tool for WebSearchTool {
    fn decl(&self) -> ToolDecl {
        ToolDecl {
            name: "web_search".to_string(),
            description: "Search the web and return text snippets of the top results."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query"}
                },
                "required": ["query"]
            }),
        }
    }

    #[instrument(skip_all)]
    fn run(&self, arguments: &str) -> Result<String> {
        let query = serde_json::from_str::<serde_json::Value>(arguments)
            .ok()
            .and_then(|value| value["query"].as_str().map(str::to_string))
            .unwrap_or_else(|| arguments.to_string());
        debug!(query = %query, "running web search");
        match self.search(&query) {
            Ok(results) => Ok(results),
            Err(err) => {
                warn!(err = %err, "search failed, answering with offline results");
                Ok(OFFLINE_RESULTS.to_string())
            }
        }
    }
}
