//! Web tools: search (Brave Search API) and page fetch with text extraction.

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::{json, Value};

use crate::error::{FemtoError, Result};
use crate::utils::truncate_chars;

use super::{Tool, ToolContext};

/// Upper bound on extracted page text fed back into the conversation.
const FETCH_MAX_CHARS: usize = 8000;

/// Search the web via the Brave Search API.
pub struct WebSearchTool {
    client: reqwest::Client,
    api_key: Option<String>,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(api_key: Option<String>, max_results: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            max_results,
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return the top results with titles, URLs and snippets"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| FemtoError::Tool("Missing 'query' argument".into()))?;

        let Some(ref api_key) = self.api_key else {
            return Err(FemtoError::Tool(
                "Web search is not configured (missing Brave API key)".into(),
            ));
        };

        let response = self
            .client
            .get("https://api.search.brave.com/res/v1/web/search")
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", &self.max_results.to_string())])
            .send()
            .await
            .map_err(|e| FemtoError::Tool(format!("Search request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(FemtoError::Tool(format!(
                "Search failed with HTTP {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FemtoError::Tool(format!("Invalid search response: {}", e)))?;

        let results = body
            .pointer("/web/results")
            .and_then(Value::as_array)
            .map(|r| r.as_slice())
            .unwrap_or_default();

        if results.is_empty() {
            return Ok(format!("No results for '{}'", query));
        }

        let mut output = String::new();
        for (i, result) in results.iter().take(self.max_results).enumerate() {
            let title = result.get("title").and_then(Value::as_str).unwrap_or("(untitled)");
            let url = result.get("url").and_then(Value::as_str).unwrap_or("");
            let snippet = result.get("description").and_then(Value::as_str).unwrap_or("");
            output.push_str(&format!("{}. {}\n   {}\n   {}\n", i + 1, title, url, snippet));
        }
        Ok(output)
    }
}

/// Extract readable text from an HTML document: the title plus paragraph,
/// heading and list-item text, whitespace-normalized.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts: Vec<String> = Vec::new();

    if let Ok(selector) = Selector::parse("title") {
        if let Some(title) = document.select(&selector).next() {
            let text = title.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                parts.push(format!("# {}", text));
            }
        }
    }

    if let Ok(selector) = Selector::parse("p, h1, h2, h3, li") {
        for element in document.select(&selector) {
            let text = element
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if !text.is_empty() {
                parts.push(text);
            }
        }
    }

    parts.join("\n")
}

/// Fetch a URL and return its readable text content.
pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its readable text content"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch (http or https)"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let url = args
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| FemtoError::Tool("Missing 'url' argument".into()))?;

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(FemtoError::Tool(format!("Unsupported URL scheme: {}", url)));
        }

        let response = self
            .client
            .get(url)
            .header("User-Agent", "femtoclaw/0.1")
            .send()
            .await
            .map_err(|e| FemtoError::Tool(format!("Fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(FemtoError::Tool(format!(
                "Fetch failed with HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FemtoError::Tool(format!("Failed to read body: {}", e)))?;

        let text = extract_text(&body);
        if text.is_empty() {
            Ok("(no readable text on page)".to_string())
        } else {
            Ok(truncate_chars(&text, FETCH_MAX_CHARS))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text() {
        let html = r#"
            <html>
              <head><title>Test Page</title></head>
              <body>
                <h1>Welcome</h1>
                <p>First   paragraph
                   with whitespace.</p>
                <script>var ignored = true;</script>
                <ul><li>Item one</li><li>Item two</li></ul>
              </body>
            </html>
        "#;
        let text = extract_text(html);
        assert!(text.starts_with("# Test Page"));
        assert!(text.contains("Welcome"));
        assert!(text.contains("First paragraph with whitespace."));
        assert!(text.contains("Item one"));
        assert!(!text.contains("ignored"));
    }

    #[test]
    fn test_extract_text_empty_document() {
        assert_eq!(extract_text("<html><body></body></html>"), "");
    }

    #[tokio::test]
    async fn test_search_without_key_fails_cleanly() {
        let tool = WebSearchTool::new(None, 5);
        let err = tool
            .execute(json!({"query": "rust"}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_http_schemes() {
        let tool = WebFetchTool::new();
        let err = tool
            .execute(json!({"url": "file:///etc/passwd"}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported URL scheme"));
    }

    #[test]
    fn test_parameter_schemas() {
        let search = WebSearchTool::new(None, 5);
        assert_eq!(search.parameters()["required"][0], "query");
        let fetch = WebFetchTool::new();
        assert_eq!(fetch.parameters()["required"][0], "url");
    }
}
