use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::agent::context::RunContext;
use crate::memory::SemanticStore;
use crate::tools::{Tool, ToolError, parse_args};

/// Lets the agent persist memories across sessions.
pub struct MemoryStoreTool {
    store: Arc<SemanticStore>,
}

impl MemoryStoreTool {
    pub fn new(store: Arc<SemanticStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct MemoryStoreArgs {
    content: String,
    category: String,
}

#[async_trait]
impl Tool for MemoryStoreTool {
    fn name(&self) -> &str {
        "memory_store"
    }

    fn description(&self) -> &str {
        "Store a memory for later recall. Use category 'core' for cross-session facts \
         (preferences, identity), 'daily' for daily context, or 'conversation' for \
         session-scoped notes."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The content to remember"
                },
                "category": {
                    "type": "string",
                    "enum": ["core", "daily", "conversation"],
                    "description": "Memory category: 'core' for persistent cross-session, 'daily' for daily context, 'conversation' for session-scoped"
                }
            },
            "required": ["content", "category"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: &str, ctx: &RunContext) -> Result<String, ToolError> {
        let args: MemoryStoreArgs = parse_args(input)?;

        // 'core' and 'daily' are global; 'conversation' binds to the
        // ambient session.
        let session_id = (args.category == "conversation" && !ctx.session_id.is_empty())
            .then_some(ctx.session_id.as_str());

        let id = self
            .store
            .store(session_id, &args.category, &args.content)
            .await
            .map_err(|e| ToolError::Execution(format!("storing memory: {e}")))?;

        Ok(format!("Memory stored (id={id}, category={})", args.category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Store;
    use tokio_util::sync::CancellationToken;

    fn ctx(session: &str) -> RunContext {
        RunContext::new(session, Arc::new(|_| {}), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_conversation_memory_is_session_scoped() {
        let db = Store::open_memory().await.unwrap();
        let tool = MemoryStoreTool::new(Arc::new(SemanticStore::new(db.clone(), None)));

        let result = tool
            .execute(
                r#"{"content":"likes rust","category":"conversation"}"#,
                &ctx("s1"),
            )
            .await
            .unwrap();
        assert!(result.contains("category=conversation"));

        let id: i64 = result
            .split("id=")
            .nth(1)
            .and_then(|s| s.split(',').next())
            .unwrap()
            .parse()
            .unwrap();
        let row = db.get_memory(id).await.unwrap().unwrap();
        assert_eq!(row.session_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_core_memory_is_global() {
        let db = Store::open_memory().await.unwrap();
        let tool = MemoryStoreTool::new(Arc::new(SemanticStore::new(db.clone(), None)));

        let result = tool
            .execute(r#"{"content":"name is Sam","category":"core"}"#, &ctx("s1"))
            .await
            .unwrap();
        let id: i64 = result
            .split("id=")
            .nth(1)
            .and_then(|s| s.split(',').next())
            .unwrap()
            .parse()
            .unwrap();
        let row = db.get_memory(id).await.unwrap().unwrap();
        assert!(row.session_id.is_none());
    }

    #[tokio::test]
    async fn test_invalid_category_rejected_by_schema_constraint() {
        let db = Store::open_memory().await.unwrap();
        let tool = MemoryStoreTool::new(Arc::new(SemanticStore::new(db, None)));

        // The DB CHECK constraint backs up the schema enum.
        let err = tool
            .execute(r#"{"content":"x","category":"bogus"}"#, &ctx("s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }
}
