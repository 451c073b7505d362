use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::agent::context::RunContext;
use crate::agent::event::Event;
use crate::tools::{Tool, ToolError, parse_args};

/// The agent's only user-visible output path: pushes a token event to the
/// ambient emit sink.
pub struct MessageTool;

#[derive(Deserialize)]
struct MessageArgs {
    text: String,
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a message to the user"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" }
            },
            "required": ["text"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: &str, ctx: &RunContext) -> Result<String, ToolError> {
        let args: MessageArgs = parse_args(input)?;
        debug!(text_len = args.text.len(), "message: sending");

        ctx.emit(Event::Token { content: args.text });

        Ok("message sent".to_string())
    }
}
