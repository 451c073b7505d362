//! Thresholded background summarisation of old turns.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::CompactionConfig;
use crate::inference::provider::{ChatResponse, Provider, input_message};
use crate::persistence::Store;

/// Summarises older conversation turns to keep context windows manageable.
///
/// Runs fire-and-forget after each turn; every failure is logged and
/// swallowed, since the next turn retries anyway. Compaction summarises,
/// it never deletes turns.
pub struct Compactor {
    store: Store,
    provider: Arc<dyn Provider>,
    cfg: CompactionConfig,
}

impl Compactor {
    pub fn new(store: Store, provider: Arc<dyn Provider>, cfg: CompactionConfig) -> Self {
        Self {
            store,
            provider,
            cfg,
        }
    }

    /// Summarise everything except the most recent `keep_recent` turns once
    /// the session passes `turn_threshold`.
    pub async fn maybe_compact(&self, session_id: &str) {
        let count = match self.store.count_turns(session_id).await {
            Ok(c) => c,
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "compaction: count error");
                return;
            }
        };
        if (count as usize) < self.cfg.turn_threshold {
            return;
        }

        let session = match self.store.get_session(session_id).await {
            Ok(Some(s)) => s,
            Ok(None) => return,
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "compaction: get session error");
                return;
            }
        };

        let turns = match self.store.get_turns(session_id).await {
            Ok(t) => t,
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "compaction: get turns error");
                return;
            }
        };
        if turns.len() <= self.cfg.keep_recent {
            return;
        }

        let to_summarise = &turns[..turns.len() - self.cfg.keep_recent];
        let cutoff_id = to_summarise[to_summarise.len() - 1].id;

        let mut text = String::new();
        if let Some(prior) = session.summary.as_deref().filter(|s| !s.is_empty()) {
            let _ = write!(text, "Previous summary:\n{prior}\n\n");
        }
        text.push_str("New turns to incorporate:\n");
        for turn in to_summarise {
            let _ = writeln!(text, "User: {}", turn.user_message);
            if let Ok(raw) = serde_json::from_str(&turn.response_json) {
                let assistant = ChatResponse::from_value(raw).output_text();
                if !assistant.is_empty() {
                    let _ = writeln!(text, "Assistant: {assistant}");
                }
            }
        }

        let summary = match self.summarise(&text).await {
            Ok(s) => s,
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "compaction: summarise error");
                return;
            }
        };

        if let Err(e) = self
            .store
            .update_session_summary(session_id, &summary, &cutoff_id.to_string())
            .await
        {
            debug!(session_id = %session_id, error = %e, "compaction: update summary error");
            return;
        }

        info!(
            session_id = %session_id,
            turns_summarised = to_summarise.len(),
            cutoff_id = cutoff_id,
            "compaction: summarised turns"
        );
    }

    async fn summarise(&self, text: &str) -> anyhow::Result<String> {
        let prompt = format!(
            "Summarize the following conversation concisely, preserving key facts, \
             decisions, and context needed for continuity. Output only the summary, \
             no preamble.\n\n{text}"
        );

        let input = vec![input_message("user", &prompt)];
        let response = self.provider.chat_stream(&input, &[], &|_| {}).await?;
        Ok(response.output_text())
    }
}
