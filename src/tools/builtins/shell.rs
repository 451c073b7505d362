use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::agent::context::RunContext;
use crate::tools::{Tool, ToolError, parse_args};
use super::truncate_output;

/// Executes a command under `sh -c` with a timeout-bound context.
///
/// A non-zero exit status is data for the model, not an error: the combined
/// output comes back with an `exit code: N` suffix as a successful result.
pub struct ShellTool;

#[derive(Deserialize)]
struct ShellArgs {
    command: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
}

fn default_timeout() -> u64 {
    30
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its combined stdout and stderr"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute (runs via sh -c)"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default: 30)"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: &str, _ctx: &RunContext) -> Result<String, ToolError> {
        let args: ShellArgs = parse_args(input)?;
        debug!(command = %args.command, timeout = args.timeout, "shell: executing");

        let child = tokio::process::Command::new("sh")
            .kill_on_drop(true)
            .arg("-c")
            .arg(&args.command)
            .output();

        let output = match tokio::time::timeout(Duration::from_secs(args.timeout), child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::Execution(format!("failed to run command: {e}")));
            }
            Err(_) => {
                return Err(ToolError::Execution(format!(
                    "command timed out after {} seconds",
                    args.timeout
                )));
            }
        };

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        let mut result = truncate_output(&combined);

        if let Some(code) = output.status.code().filter(|&c| c != 0) {
            result.push_str(&format!("\nexit code: {code}"));
        }
        Ok(result)
    }
}
