//! The tool capability contract and its registry.

pub mod builtins;
pub mod registry;

pub use registry::ToolRegistry;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::context::RunContext;

/// Error from a tool execution. The runner folds these back into model
/// context as `error: ...` result strings; they never abort a run.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("{0}")]
    Execution(String),
}

/// The Tool trait — every capability the agent can invoke implements this.
///
/// Tools receive their arguments as the raw JSON string the model produced
/// and return a plain string that is fed back into model context.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in model tool definitions; the registry key.
    fn name(&self) -> &str;

    /// Human-readable description for the model.
    fn description(&self) -> &str;

    /// JSON Schema for parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute with the model-provided argument JSON.
    async fn execute(&self, input: &str, ctx: &RunContext) -> Result<String, ToolError>;
}

/// Deserialize tool arguments from the raw JSON string.
#[must_use = "parse result should be checked for InvalidParams errors"]
pub fn parse_args<T: serde::de::DeserializeOwned>(input: &str) -> Result<T, ToolError> {
    serde_json::from_str(input).map_err(|e| ToolError::InvalidParams(e.to_string()))
}
