//! The turn loop: call the model, fan out tool calls, iterate to fixed point.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::inference::provider::{
    ChatResponse, FunctionCall, InputItem, Provider, ToolDef, function_call_output, input_message,
};
use crate::memory::{Compactor, Memory, SemanticStore};
use crate::persistence::Store;
use crate::tools::ToolRegistry;
use super::context::RunContext;
use super::event::Event;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You must use the message tool to communicate with the user. Do not produce raw text output.";

/// Drives one conversation turn to completion.
///
/// Each loop iteration is a single model call where the model reasons about
/// the current state and picks actions in one step. A failed tool goes back
/// into context as an `error: ...` result, so the model sees it on the next
/// iteration and adapts; only model-call failures and cancellation end the
/// run. The loop exits when the model returns no tool calls.
///
/// Every error-return path emits an `Error` event first, so callers never
/// need to report failures themselves.
pub struct Runner {
    provider: Arc<dyn Provider>,
    store: Store,
    memory: Arc<dyn Memory>,
    registry: ToolRegistry,
    /// Tool definitions frozen at construction.
    tools: Vec<ToolDef>,
    system_prompt: String,
    semantic_store: Option<Arc<SemanticStore>>,
    compactor: Option<Arc<Compactor>>,
}

impl Runner {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Store,
        memory: Arc<dyn Memory>,
        registry: ToolRegistry,
    ) -> Self {
        let tools = registry.tool_definitions();
        Self {
            provider,
            store,
            memory,
            registry,
            tools,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            semantic_store: None,
            compactor: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Enable background auto-save of each user message as a conversation
    /// memory.
    pub fn with_semantic_store(mut self, semantic_store: Arc<SemanticStore>) -> Self {
        self.semantic_store = Some(semantic_store);
        self
    }

    pub fn with_compactor(mut self, compactor: Arc<Compactor>) -> Self {
        self.compactor = Some(compactor);
        self
    }

    /// Run one user message to completion, streaming events through
    /// `ctx.emit`.
    pub async fn run(&self, ctx: RunContext, message: &str) -> Result<()> {
        let session_id = ctx.session_id.clone();

        if let Err(e) = self.store.ensure_session(&session_id, "default").await {
            warn!(session_id = %session_id, error = %e, "failed to ensure session");
        }

        let mut input = match self
            .memory
            .recall_with_context(&session_id, message)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "failed to recall memory");
                Vec::new()
            }
        };
        debug!(session_id = %session_id, history_items = input.len(), "memory recalled");

        input.push(input_message("developer", &self.system_prompt));
        input.push(input_message("user", message));

        let response = self.turn_loop(&ctx, input).await?;

        self.persist(&ctx, message, &response).await;

        ctx.emit(Event::Done);
        Ok(())
    }

    /// Fixed-point iteration: model call, tool fan-out, repeat until the
    /// model returns zero function calls or the request is cancelled.
    async fn turn_loop(&self, ctx: &RunContext, mut input: Vec<InputItem>) -> Result<ChatResponse> {
        let mut iteration = 0u32;

        loop {
            if ctx.cancel.is_cancelled() {
                ctx.emit(Event::Error {
                    error: "request cancelled".to_string(),
                });
                anyhow::bail!("request cancelled");
            }

            let response = match self
                .provider
                .chat_stream(&input, &self.tools, &|_token| {
                    // Streamed text deltas are ignored; user-visible output
                    // goes through the message tool.
                })
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    ctx.emit(Event::Error {
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            };

            let usage = response.usage();
            debug!(
                session_id = %ctx.session_id,
                iteration,
                model = %response.model(),
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "model call complete"
            );
            iteration += 1;

            // Feed the model's output (including reasoning items) back into
            // context for the next iteration.
            input.extend(response.output_as_input());

            let calls = response.function_calls();
            if calls.is_empty() {
                // No tool calls: the model considers the task done.
                return Ok(response);
            }

            let results = self.act(ctx, &calls).await;
            input.extend(results);
        }
    }

    /// Execute tool calls concurrently, emitting events for each, and return
    /// the results as `function_call_output` items. The result order matches
    /// `calls` so call/output pairing stays stable by position even though
    /// `call_id` is the canonical linkage.
    async fn act(&self, ctx: &RunContext, calls: &[FunctionCall]) -> Vec<InputItem> {
        for call in calls {
            ctx.emit(Event::ToolCall {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            });
        }

        let futures = calls.iter().map(|call| async move {
            let Some(tool) = self.registry.get(&call.name) else {
                warn!(name = %call.name, "unknown tool call");
                let content = "error: unknown tool".to_string();
                ctx.emit(Event::ToolResult {
                    name: call.name.clone(),
                    content: content.clone(),
                });
                return function_call_output(&call.call_id, &content);
            };

            let started = Instant::now();
            let content = match tool.execute(&call.arguments, ctx).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(name = %call.name, error = %e, "tool execution failed");
                    format!("error: {e}")
                }
            };
            debug!(
                name = %call.name,
                duration_ms = started.elapsed().as_millis() as u64,
                "tool executed"
            );

            ctx.emit(Event::ToolResult {
                name: call.name.clone(),
                content: content.clone(),
            });
            function_call_output(&call.call_id, &content)
        });

        join_all(futures).await
    }

    /// Save the turn and fire background memory work. Persistence failures
    /// are logged, never fatal. Background tasks are detached so request
    /// completion (or cancellation) does not kill them.
    async fn persist(&self, ctx: &RunContext, message: &str, response: &ChatResponse) {
        let session_id = &ctx.session_id;

        if let Err(e) = self.store.save_turn(session_id, message, response).await {
            warn!(session_id = %session_id, error = %e, "failed to save turn");
        }

        if let Some(semantic_store) = self.semantic_store.clone() {
            let sid = session_id.clone();
            let msg = message.to_string();
            tokio::spawn(async move {
                if let Err(e) = semantic_store.store(Some(&sid), "conversation", &msg).await {
                    warn!(session_id = %sid, error = %e, "auto-save memory failed");
                }
            });
        }

        if let Some(compactor) = self.compactor.clone() {
            let sid = session_id.clone();
            tokio::spawn(async move {
                compactor.maybe_compact(&sid).await;
            });
        }
    }
}
