use serde::Serialize;
use serde_json::{Value, json};

/// Everything a runner reports outward flows through typed events.
///
/// The gateway maps each event to one SSE frame; channels fold the stream
/// into a single reply. `data()` is the per-kind payload without the tag.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// User-visible text, pushed by the message tool.
    Token { content: String },

    /// The model requested a tool execution (pre-execution).
    ToolCall { name: String, arguments: String },

    /// A tool finished; errors arrive here as `error: ...` content, not as
    /// an `Error` event.
    ToolResult { name: String, content: String },

    /// The run failed; no further events follow.
    Error { error: String },

    /// The run completed normally.
    Done,
}

impl Event {
    /// Event kind name, used as the SSE event field.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Token { .. } => "token",
            Event::ToolCall { .. } => "tool_call",
            Event::ToolResult { .. } => "tool_result",
            Event::Error { .. } => "error",
            Event::Done => "done",
        }
    }

    /// Per-kind JSON payload, used as the SSE data field.
    pub fn data(&self) -> Value {
        match self {
            Event::Token { content } => json!({ "content": content }),
            Event::ToolCall { name, arguments } => json!({ "name": name, "arguments": arguments }),
            Event::ToolResult { name, content } => json!({ "name": name, "content": content }),
            Event::Error { error } => json!({ "error": error }),
            Event::Done => json!({}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds() {
        assert_eq!(Event::Token { content: "x".into() }.kind(), "token");
        assert_eq!(Event::Done.kind(), "done");
        assert_eq!(Event::Error { error: "e".into() }.kind(), "error");
    }

    #[test]
    fn test_event_data_shapes() {
        let data = Event::ToolCall {
            name: "shell".into(),
            arguments: "{\"command\":\"ls\"}".into(),
        }
        .data();
        assert_eq!(data["name"], "shell");
        assert_eq!(data["arguments"], "{\"command\":\"ls\"}");

        assert_eq!(Event::Done.data(), json!({}));
        assert_eq!(
            Event::Token { content: "hi".into() }.data(),
            json!({ "content": "hi" })
        );
    }

    #[test]
    fn test_event_serialization_tags() {
        let json = serde_json::to_string(&Event::Token { content: "hi".into() }).unwrap();
        assert!(json.contains("\"type\":\"token\""));
        assert!(json.contains("\"content\":\"hi\""));
    }
}
