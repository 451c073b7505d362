//! Built-in tool implementations:
//! - `message` — push text to the user
//! - `shell` — execute a shell command
//! - `file` — read or write files
//! - `web` — web search and page fetch
//! - `memory_store` / `memory_recall` — semantic memory access
//! - `delegate` — spawn a scoped sub-agent

pub mod delegate;
pub mod file;
pub mod memory_recall;
pub mod memory_store;
pub mod message;
pub mod shell;
pub mod web;

pub use delegate::DelegateTool;
pub use file::FileTool;
pub use memory_recall::MemoryRecallTool;
pub use memory_store::MemoryStoreTool;
pub use message::MessageTool;
pub use shell::ShellTool;
pub use web::WebTool;

/// Cap applied to tool output fed back into model context.
pub(crate) const MAX_OUTPUT_BYTES: usize = 10_000;

/// Lossy-truncate raw output at the byte cap with a trailing marker.
pub(crate) fn truncate_output(bytes: &[u8]) -> String {
    if bytes.len() > MAX_OUTPUT_BYTES {
        format!(
            "{}\n... (truncated)",
            String::from_utf8_lossy(&bytes[..MAX_OUTPUT_BYTES])
        )
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_output() {
        assert_eq!(truncate_output(b"short"), "short");

        let long = vec![b'x'; MAX_OUTPUT_BYTES + 100];
        let truncated = truncate_output(&long);
        assert!(truncated.ends_with("\n... (truncated)"));
        assert_eq!(
            truncated.len(),
            MAX_OUTPUT_BYTES + "\n... (truncated)".len()
        );
    }
}
