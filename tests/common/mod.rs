#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use pingu::agent::{Emit, Event};
use pingu::inference::provider::{ChatResponse, InputItem, Provider, TokenSink};

/// A provider that replays a fixed sequence of response payloads and
/// records the input it was called with each time.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Value>>,
    inputs: Mutex<Vec<Vec<InputItem>>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Value>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// The input item list of every call made so far, in call order.
    pub fn inputs(&self) -> Vec<Vec<InputItem>> {
        self.inputs.lock().unwrap().clone()
    }

    pub fn calls_made(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn chat_stream(
        &self,
        input: &[InputItem],
        _tools: &[pingu::inference::ToolDef],
        _on_token: TokenSink<'_>,
    ) -> Result<ChatResponse> {
        self.inputs.lock().unwrap().push(input.to_vec());
        let raw = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("scripted provider exhausted"))?;
        Ok(ChatResponse::from_value(raw))
    }
}

/// A provider whose every call fails.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    async fn chat_stream(
        &self,
        _input: &[InputItem],
        _tools: &[pingu::inference::ToolDef],
        _on_token: TokenSink<'_>,
    ) -> Result<ChatResponse> {
        anyhow::bail!("model unavailable")
    }
}

/// A response payload with a single assistant text message and no tool calls.
pub fn text_response(text: &str) -> Value {
    json!({
        "model": "scripted-model",
        "output": [{
            "type": "message",
            "role": "assistant",
            "content": [{ "type": "output_text", "text": text }],
        }],
        "usage": { "input_tokens": 10, "output_tokens": 5 },
    })
}

/// A response payload requesting the given `(call_id, name, args)` tool calls.
pub fn tool_call_response(calls: &[(&str, &str, Value)]) -> Value {
    let output: Vec<Value> = calls
        .iter()
        .map(|(call_id, name, args)| {
            json!({
                "type": "function_call",
                "call_id": call_id,
                "name": name,
                "arguments": args.to_string(),
            })
        })
        .collect();
    json!({
        "model": "scripted-model",
        "output": output,
        "usage": { "input_tokens": 10, "output_tokens": 5 },
    })
}

/// An emit sink that appends every event to a shared vector.
pub fn collecting_emit() -> (Emit, Arc<Mutex<Vec<Event>>>) {
    let events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let emit: Emit = Arc::new(move |event| sink.lock().unwrap().push(event));
    (emit, events)
}

/// Render collected events as `kind` strings for order assertions.
pub fn event_kinds(events: &[Event]) -> Vec<&'static str> {
    events.iter().map(Event::kind).collect()
}
