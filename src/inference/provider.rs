//! Language-model provider: wire types for the Responses API and an
//! OpenAI-compatible HTTP client.
//!
//! The raw model reply is kept as JSON so a turn can round-trip losslessly:
//! output items from one call are fed back verbatim as input items on the
//! next. Anything typed here is a *view* over that JSON, never a lossy copy.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, error, warn};

/// A single item in the model input list. Output items from a previous
/// response are valid input items, which is what makes history replay
/// lossless.
pub type InputItem = Value;

/// Output item kinds that have a defined input representation. Anything
/// else is dropped (with a debug log) when replaying history.
const REPLAYABLE_KINDS: &[&str] = &[
    "message",
    "function_call",
    "reasoning",
    "file_search_call",
    "web_search_call",
    "computer_call",
    "code_interpreter_call",
];

/// Build a plain text message input item for the given role
/// (`user`, `developer`, ...).
pub fn input_message(role: &str, text: &str) -> InputItem {
    json!({
        "type": "message",
        "role": role,
        "content": [{ "type": "input_text", "text": text }],
    })
}

/// Build a `function_call_output` item bound to the originating `call_id`.
pub fn function_call_output(call_id: &str, output: &str) -> InputItem {
    json!({
        "type": "function_call_output",
        "call_id": call_id,
        "output": output,
    })
}

/// Convert response output items into input items for the next model call.
/// Each replayable item passes through verbatim; unknown kinds are skipped.
pub fn output_to_input(output: &[Value]) -> Vec<InputItem> {
    let mut items = Vec::with_capacity(output.len());
    for item in output {
        let kind = item.get("type").and_then(Value::as_str).unwrap_or("");
        if REPLAYABLE_KINDS.contains(&kind) {
            items.push(item.clone());
        } else {
            debug!(kind = %kind, "skipping unknown output item type");
        }
    }
    items
}

/// A tool definition advertised to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDef {
    /// Responses-API wire form of this definition.
    fn to_wire(&self) -> Value {
        json!({
            "type": "function",
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters,
            "strict": true,
        })
    }
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

/// Token usage reported by the model.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

/// A complete model reply, wrapping the raw response payload.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    raw: Value,
}

impl ChatResponse {
    pub fn from_value(raw: Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// The exact payload as stored in the turns table.
    pub fn raw_json(&self) -> String {
        self.raw.to_string()
    }

    pub fn model(&self) -> &str {
        self.raw.get("model").and_then(Value::as_str).unwrap_or("")
    }

    pub fn output(&self) -> &[Value] {
        self.raw
            .get("output")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Output items reformatted as input items for the next call.
    pub fn output_as_input(&self) -> Vec<InputItem> {
        output_to_input(self.output())
    }

    /// All `function_call` items in the output, in order.
    pub fn function_calls(&self) -> Vec<FunctionCall> {
        self.output()
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("function_call"))
            .map(|item| FunctionCall {
                call_id: item
                    .get("call_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                name: item
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                arguments: item
                    .get("arguments")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect()
    }

    /// Concatenated `output_text` parts of all message items.
    pub fn output_text(&self) -> String {
        let mut text = String::new();
        for item in self.output() {
            if item.get("type").and_then(Value::as_str) != Some("message") {
                continue;
            }
            let Some(parts) = item.get("content").and_then(Value::as_array) else {
                continue;
            };
            for part in parts {
                if part.get("type").and_then(Value::as_str) == Some("output_text")
                    && let Some(t) = part.get("text").and_then(Value::as_str)
                {
                    text.push_str(t);
                }
            }
        }
        text
    }

    pub fn usage(&self) -> Usage {
        let usage = self.raw.get("usage");
        Usage {
            input_tokens: usage
                .and_then(|u| u.get("input_tokens"))
                .and_then(Value::as_i64)
                .unwrap_or(0),
            output_tokens: usage
                .and_then(|u| u.get("output_tokens"))
                .and_then(Value::as_i64)
                .unwrap_or(0),
        }
    }
}

/// Callback invoked with each streamed text delta.
pub type TokenSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// A chat-capable language-model provider.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Run one model call. Implementations should stream when possible and
    /// fall back to a non-streaming request on stream failure.
    async fn chat_stream(
        &self,
        input: &[InputItem],
        tools: &[ToolDef],
        on_token: TokenSink<'_>,
    ) -> Result<ChatResponse>;
}

// ─── OpenAI-compatible client ────────────────────────────────────

/// HTTP client for an OpenAI-compatible `/responses` endpoint.
pub struct OpenAiProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let base = if base_url.is_empty() {
            "https://api.openai.com/v1"
        } else {
            base_url
        };
        // No overall timeout: long generations are legitimate. Connect
        // failures still surface promptly.
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .with_context(|| "failed to build LLM HTTP client")?;
        Ok(Self {
            client,
            url: format!("{}/responses", base.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn request_body(&self, input: &[InputItem], tools: &[ToolDef], stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "input": input,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(ToolDef::to_wire).collect());
        }
        if stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.header("Authorization", format!("Bearer {}", self.api_key))
        }
    }

    async fn try_stream(
        &self,
        input: &[InputItem],
        tools: &[ToolDef],
        on_token: TokenSink<'_>,
    ) -> Result<ChatResponse> {
        let body = self.request_body(input, tools, true);
        let resp = self
            .authed(self.client.post(&self.url))
            .json(&body)
            .send()
            .await
            .with_context(|| "LLM streaming request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let preview: String = text.chars().take(1024).collect();
            error!(status = %status, body = %preview, "LLM API error response");
            anyhow::bail!("LLM returned {status}");
        }

        let mut stream = resp.bytes_stream();
        let mut buffer = String::new();
        let mut completed: Option<Value> = None;
        let mut event_count = 0usize;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.with_context(|| format!("stream error after {event_count} events"))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find("\n\n") {
                let frame: String = buffer.drain(..pos + 2).collect();
                let Some(event) = parse_sse_frame(&frame) else {
                    continue;
                };
                event_count += 1;
                match event.get("type").and_then(Value::as_str) {
                    Some("response.output_text.delta") => {
                        if let Some(delta) = event.get("delta").and_then(Value::as_str)
                            && !delta.is_empty()
                        {
                            on_token(delta);
                        }
                    }
                    Some("response.completed") => {
                        completed = event.get("response").cloned();
                    }
                    Some("response.failed") => {
                        let msg = event
                            .pointer("/response/error/message")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown error");
                        anyhow::bail!("response failed: {msg}");
                    }
                    _ => {}
                }
            }
        }

        let raw = completed.with_context(|| {
            format!("stream ended without completed response ({event_count} events)")
        })?;
        Ok(ChatResponse::from_value(raw))
    }

    async fn chat_non_stream(&self, input: &[InputItem], tools: &[ToolDef]) -> Result<ChatResponse> {
        let body = self.request_body(input, tools, false);
        let resp = self
            .authed(self.client.post(&self.url))
            .json(&body)
            .send()
            .await
            .with_context(|| "LLM request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let preview: String = text.chars().take(1024).collect();
            error!(status = %status, body = %preview, "LLM API error response");
            anyhow::bail!("LLM returned {status}");
        }

        let raw: Value = resp
            .json()
            .await
            .with_context(|| "LLM response parse failed")?;
        let response = ChatResponse::from_value(raw);
        debug!(
            model = %response.model(),
            output_items = response.output().len(),
            input_tokens = response.usage().input_tokens,
            output_tokens = response.usage().output_tokens,
            "non-streaming response"
        );
        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn chat_stream(
        &self,
        input: &[InputItem],
        tools: &[ToolDef],
        on_token: TokenSink<'_>,
    ) -> Result<ChatResponse> {
        match self.try_stream(input, tools, on_token).await {
            Ok(resp) => Ok(resp),
            Err(e) => {
                warn!(error = %e, "streaming failed, falling back to non-streaming");
                self.chat_non_stream(input, tools).await
            }
        }
    }
}

/// Extract the JSON payload from one SSE frame. Frames without a data line
/// (comments, keep-alives) yield `None`.
fn parse_sse_frame(frame: &str) -> Option<Value> {
    let mut data = String::new();
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
        }
    }
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    serde_json::from_str(&data).ok()
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response() -> ChatResponse {
        ChatResponse::from_value(json!({
            "model": "gpt-4.1-nano",
            "output": [
                {
                    "type": "reasoning",
                    "id": "rs_1",
                    "summary": [],
                },
                {
                    "type": "message",
                    "role": "assistant",
                    "content": [
                        { "type": "output_text", "text": "Hello " },
                        { "type": "output_text", "text": "world" },
                    ],
                },
                {
                    "type": "function_call",
                    "call_id": "call_1",
                    "name": "message",
                    "arguments": "{\"text\":\"hi\"}",
                },
                { "type": "mystery_item", "data": 42 },
            ],
            "usage": { "input_tokens": 12, "output_tokens": 7 },
        }))
    }

    #[test]
    fn test_function_call_extraction() {
        let resp = sample_response();
        let calls = resp.function_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].call_id, "call_1");
        assert_eq!(calls[0].name, "message");
        assert_eq!(calls[0].arguments, "{\"text\":\"hi\"}");
    }

    #[test]
    fn test_output_text_concatenation() {
        assert_eq!(sample_response().output_text(), "Hello world");
    }

    #[test]
    fn test_output_to_input_drops_unknown_kinds() {
        let resp = sample_response();
        let input = resp.output_as_input();
        // reasoning, message, function_call survive; mystery_item is dropped
        assert_eq!(input.len(), 3);
        assert_eq!(input[0]["type"], "reasoning");
        assert_eq!(input[2]["type"], "function_call");
        // round-trip is verbatim
        assert_eq!(&input[1], &resp.output()[1]);
    }

    #[test]
    fn test_usage_and_model() {
        let resp = sample_response();
        assert_eq!(resp.model(), "gpt-4.1-nano");
        assert_eq!(resp.usage().input_tokens, 12);
        assert_eq!(resp.usage().output_tokens, 7);
    }

    #[test]
    fn test_raw_json_round_trip() {
        let resp = sample_response();
        let reparsed: Value = serde_json::from_str(&resp.raw_json()).unwrap();
        assert_eq!(&reparsed, resp.raw());
    }

    #[test]
    fn test_input_item_builders() {
        let msg = input_message("developer", "rules");
        assert_eq!(msg["type"], "message");
        assert_eq!(msg["role"], "developer");
        assert_eq!(msg["content"][0]["text"], "rules");

        let out = function_call_output("call_9", "done");
        assert_eq!(out["type"], "function_call_output");
        assert_eq!(out["call_id"], "call_9");
        assert_eq!(out["output"], "done");
    }

    #[test]
    fn test_parse_sse_frame() {
        let frame = "event: response.output_text.delta\ndata: {\"type\":\"response.output_text.delta\",\"delta\":\"hi\"}\n\n";
        let event = parse_sse_frame(frame).unwrap();
        assert_eq!(event["delta"], "hi");

        assert!(parse_sse_frame(": keep-alive\n\n").is_none());
        assert!(parse_sse_frame("data: [DONE]\n\n").is_none());
    }
}
