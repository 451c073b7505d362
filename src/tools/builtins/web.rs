use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt::Write as _;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

use crate::agent::context::RunContext;
use crate::tools::{Tool, ToolError, parse_args};
use super::truncate_output;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const FETCH_BODY_LIMIT: usize = 100 * 1024;
const SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("valid regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Web search (Brave API) and page fetch.
pub struct WebTool {
    client: reqwest::Client,
    brave_api_key: String,
}

impl WebTool {
    pub fn new(brave_api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            brave_api_key: brave_api_key.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct WebArgs {
    action: WebAction,
    #[serde(default)]
    query: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    count: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum WebAction {
    Search,
    Fetch,
}

#[derive(Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: BraveWeb,
}

#[derive(Deserialize, Default)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

#[async_trait]
impl Tool for WebTool {
    fn name(&self) -> &str {
        "web"
    }

    fn description(&self) -> &str {
        "Search the web or fetch the text content of a URL"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["search", "fetch"],
                    "description": "search queries the web; fetch downloads one page"
                },
                "query": {
                    "type": "string",
                    "description": "Search query (search action)"
                },
                "url": {
                    "type": "string",
                    "description": "URL to fetch (fetch action)"
                },
                "count": {
                    "type": "integer",
                    "description": "Number of search results, 1-20 (default: 5)"
                }
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: &str, _ctx: &RunContext) -> Result<String, ToolError> {
        let args: WebArgs = parse_args(input)?;
        match args.action {
            WebAction::Search => self.search(&args.query, args.count).await,
            WebAction::Fetch => self.fetch(&args.url).await,
        }
    }
}

impl WebTool {
    async fn search(&self, query: &str, count: Option<i64>) -> Result<String, ToolError> {
        if query.is_empty() {
            return Err(ToolError::InvalidParams("query is required for search".into()));
        }
        let count = count.unwrap_or(5).clamp(1, 20);
        debug!(query = %query, count, "web: searching");

        let resp = self
            .client
            .get(SEARCH_URL)
            .query(&[("q", query), ("count", &count.to_string())])
            .header("X-Subscription-Token", &self.brave_api_key)
            .header("Accept", "application/json")
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| ToolError::Execution(format!("search request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(ToolError::Execution(format!(
                "search API returned {}",
                resp.status()
            )));
        }

        let parsed: BraveResponse = resp
            .json()
            .await
            .map_err(|e| ToolError::Execution(format!("search response parse failed: {e}")))?;

        if parsed.web.results.is_empty() {
            return Ok("No results found.".to_string());
        }

        let mut out = String::new();
        for (i, r) in parsed.web.results.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = write!(out, "{}. {}\n   {}\n   {}", i + 1, r.title, r.url, r.description);
        }
        Ok(out)
    }

    async fn fetch(&self, url: &str) -> Result<String, ToolError> {
        if url.is_empty() {
            return Err(ToolError::InvalidParams("url is required for fetch".into()));
        }
        debug!(url = %url, "web: fetching");

        let resp = self
            .client
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| ToolError::Execution(format!("fetch failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(ToolError::Execution(format!(
                "fetch returned {}",
                resp.status()
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| ToolError::Execution(format!("reading body failed: {e}")))?;
        let capped = &body[..body.len().min(FETCH_BODY_LIMIT)];

        let text = strip_html(&String::from_utf8_lossy(capped));
        Ok(truncate_output(text.as_bytes()))
    }
}

/// Strip tags and collapse whitespace. Good enough for feeding page text to
/// a model; not an HTML parser.
fn strip_html(html: &str) -> String {
    let without_blocks = SCRIPT_STYLE_RE.replace_all(html, " ");
    let without_tags = TAG_RE.replace_all(&without_blocks, " ");
    WHITESPACE_RE
        .replace_all(&without_tags, " ")
        .trim()
        .to_string()
}
