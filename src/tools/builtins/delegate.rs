use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::agent::context::RunContext;
use crate::agent::event::Event;
use crate::agent::factory::RunnerFactory;
use crate::tools::{Tool, ToolError, parse_args};

/// Depth bound on recursive delegation, carried in the run context. A
/// single check at tool entry is race-free because context is per-call.
const MAX_DELEGATION_DEPTH: u32 = 3;

/// Spawns a scoped sub-agent to handle a task. The sub-agent's user-visible
/// channel is this tool's return string, not the outer event stream.
pub struct DelegateTool {
    factory: Arc<RunnerFactory>,
}

impl DelegateTool {
    pub fn new(factory: Arc<RunnerFactory>) -> Self {
        Self { factory }
    }
}

#[derive(Deserialize)]
struct DelegateArgs {
    agent: String,
    task: String,
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        "delegate"
    }

    fn description(&self) -> &str {
        "Delegate a task to a specialized sub-agent"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent": {
                    "type": "string",
                    "description": "Name of the agent profile to delegate to",
                    "enum": self.factory.profiles(),
                },
                "task": {
                    "type": "string",
                    "description": "The task description for the sub-agent"
                }
            },
            "required": ["agent", "task"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: &str, ctx: &RunContext) -> Result<String, ToolError> {
        let args: DelegateArgs = parse_args(input)?;

        if ctx.delegation_depth >= MAX_DELEGATION_DEPTH {
            return Err(ToolError::Execution(format!(
                "maximum delegation depth ({MAX_DELEGATION_DEPTH}) exceeded"
            )));
        }

        let runner = self
            .factory
            .build(&args.agent)
            .map_err(|e| ToolError::Execution(format!("building sub-agent: {e}")))?;

        let sub_session = format!("{}:delegate:{}", ctx.session_id, args.agent);
        debug!(
            agent = %args.agent,
            sub_session = %sub_session,
            depth = ctx.delegation_depth + 1,
            "delegating"
        );

        // Capture the sub-agent's token events into a buffer; everything
        // else stays inside the sub-run.
        let buffer: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
        let sink = buffer.clone();
        let capture: crate::agent::context::Emit = Arc::new(move |event| {
            if let Event::Token { content } = event {
                let mut buf = sink.lock().unwrap_or_else(|e| e.into_inner());
                buf.push_str(&content);
            }
        });

        let sub_ctx = ctx.child(sub_session, capture);
        runner
            .run(sub_ctx, &args.task)
            .await
            .map_err(|e| ToolError::Execution(format!("sub-agent {} failed: {e}", args.agent)))?;

        let result = buffer.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if result.is_empty() {
            Ok("(sub-agent produced no output)".to_string())
        } else {
            Ok(result)
        }
    }
}
