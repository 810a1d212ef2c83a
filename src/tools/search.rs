//! Web search through the Serper (Google) API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::SearchConfig;
use crate::error::ToolError;

use super::Tool;

/// Snippets past this length add prompt tokens without adding much signal.
const MAX_SNIPPET_CHARS: usize = 300;

pub struct SerperSearchTool {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    num_results: usize,
}

impl SerperSearchTool {
    /// A missing key is not an error here, only when the tool is called.
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
            num_results: config.num_results,
        }
    }

    fn query(args: &HashMap<String, String>) -> Result<&str, ToolError> {
        args.get("query")
            .or_else(|| args.get("input"))
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("missing required arg: query".to_string()))
    }

    fn format_results(query: &str, response: &SearchResponse) -> String {
        let mut out = format!("Search results for \"{}\":\n", query);

        if let Some(answer) = &response.answer_box {
            let text = answer
                .answer
                .as_deref()
                .or(answer.snippet.as_deref())
                .unwrap_or_default();
            if !text.is_empty() {
                out.push_str(&format!("Answer: {}\n", truncate(text, MAX_SNIPPET_CHARS)));
            }
        }

        if response.organic.is_empty() {
            out.push_str("No results found.\n");
            return out;
        }

        for (i, result) in response.organic.iter().enumerate() {
            out.push_str(&format!("{}. {} ({})\n", i + 1, result.title, result.link));
            if let Some(snippet) = &result.snippet {
                out.push_str(&format!("   {}\n", truncate(snippet, MAX_SNIPPET_CHARS)));
            }
        }
        out
    }
}

#[async_trait]
impl Tool for SerperSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the internet for health articles and medical information. Args: {\"query\": \"<search terms>\"}"
    }

    async fn execute(&self, args: &HashMap<String, String>) -> Result<String, ToolError> {
        let query = Self::query(args)?;
        let api_key = self.api_key.as_deref().ok_or(ToolError::MissingApiKey)?;

        let body = SearchRequest {
            q: query,
            num: self.num_results,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ToolError::Api { status, message });
        }

        let response: SearchResponse = resp
            .json()
            .await
            .map_err(|e| ToolError::Request(format!("invalid search response: {}", e)))?;

        Ok(Self::format_results(query, &response))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

// --- API types ---

#[derive(Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
    #[serde(rename = "answerBox")]
    answer_box: Option<AnswerBox>,
}

#[derive(Deserialize)]
struct OrganicResult {
    title: String,
    link: String,
    snippet: Option<String>,
}

#[derive(Deserialize)]
struct AnswerBox {
    answer: Option<String>,
    snippet: Option<String>,
}
