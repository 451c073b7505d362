use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt::Write as _;
use std::sync::Arc;

use crate::agent::context::RunContext;
use crate::persistence::HybridSearcher;
use crate::tools::{Tool, ToolError, parse_args};

const RECALL_LIMIT: usize = 10;

/// Lets the agent search stored memories explicitly (on top of any
/// automatic context injection).
pub struct MemoryRecallTool {
    searcher: Arc<HybridSearcher>,
}

impl MemoryRecallTool {
    pub fn new(searcher: Arc<HybridSearcher>) -> Self {
        Self { searcher }
    }
}

#[derive(Deserialize)]
struct MemoryRecallArgs {
    query: String,
}

#[async_trait]
impl Tool for MemoryRecallTool {
    fn name(&self) -> &str {
        "memory_recall"
    }

    fn description(&self) -> &str {
        "Search stored memories by keyword and semantic similarity. Returns the most relevant memories."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query to find relevant memories"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: &str, ctx: &RunContext) -> Result<String, ToolError> {
        let args: MemoryRecallArgs = parse_args(input)?;

        let results = self
            .searcher
            .search(&args.query, &ctx.session_id, RECALL_LIMIT)
            .await
            .map_err(|e| ToolError::Execution(format!("searching memories: {e}")))?;

        if results.is_empty() {
            return Ok("No relevant memories found.".to_string());
        }

        let mut out = String::new();
        for (i, r) in results.iter().enumerate() {
            if i > 0 {
                out.push_str("\n---\n");
            }
            let _ = write!(out, "[{}] (score={:.2}) {}", r.category, r.score, r.content);
        }
        Ok(out)
    }
}
