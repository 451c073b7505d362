use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::agent::context::RunContext;
use crate::config::expand_home;
use crate::tools::{Tool, ToolError, parse_args};
use super::truncate_output;

/// Reads and writes files on the host. `~/...` paths expand to the home
/// directory. Writes create parent directories (0755) and files (0644).
pub struct FileTool;

#[derive(Deserialize)]
struct FileArgs {
    action: FileAction,
    path: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum FileAction {
    Read,
    Write,
}

#[async_trait]
impl Tool for FileTool {
    fn name(&self) -> &str {
        "file"
    }

    fn description(&self) -> &str {
        "Read or write files"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["read", "write"],
                    "description": "Whether to read or write the file"
                },
                "path": {
                    "type": "string",
                    "description": "File path; ~/ expands to the home directory"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write (write action only)"
                }
            },
            "required": ["action", "path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: &str, _ctx: &RunContext) -> Result<String, ToolError> {
        let args: FileArgs = parse_args(input)?;
        let path = expand_home(&args.path);

        match args.action {
            FileAction::Read => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| ToolError::Execution(format!("reading {}: {e}", path.display())))?;
                debug!(path = %path.display(), bytes = bytes.len(), "file: read");
                Ok(truncate_output(&bytes))
            }
            FileAction::Write => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    let mut builder = tokio::fs::DirBuilder::new();
                    builder.recursive(true);
                    #[cfg(unix)]
                    builder.mode(0o755);
                    builder.create(parent).await.map_err(|e| {
                        ToolError::Execution(format!("creating {}: {e}", parent.display()))
                    })?;
                }
                tokio::fs::write(&path, &args.content)
                    .await
                    .map_err(|e| ToolError::Execution(format!("writing {}: {e}", path.display())))?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = tokio::fs::set_permissions(
                        &path,
                        std::fs::Permissions::from_mode(0o644),
                    )
                    .await;
                }
                debug!(path = %path.display(), bytes = args.content.len(), "file: wrote");
                Ok(format!("wrote {} bytes to {}", args.content.len(), path.display()))
            }
        }
    }
}
