//! Memory views: what the runner recalls as prior context for a session.

pub mod compaction;
pub mod semantic;

pub use compaction::Compactor;
pub use semantic::SemanticStore;

use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

use crate::inference::provider::{InputItem, input_message};
use crate::persistence::{HybridSearcher, Store};

/// Recalls prior context for a session to feed into the model.
///
/// `recall_with_context` defaults to plain recall; views that augment the
/// history (memory injection) override it.
#[async_trait]
pub trait Memory: Send + Sync {
    async fn recall(&self, session_id: &str) -> Result<Vec<InputItem>>;

    async fn recall_with_context(
        &self,
        session_id: &str,
        _user_message: &str,
    ) -> Result<Vec<InputItem>> {
        self.recall(session_id).await
    }
}

/// Plain recall: the full conversation history.
pub struct ConversationMemory {
    store: Store,
}

impl ConversationMemory {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Memory for ConversationMemory {
    async fn recall(&self, session_id: &str) -> Result<Vec<InputItem>> {
        self.store.load_input_history(session_id).await
    }
}

/// History plus auto-injected relevant memories from the hybrid index,
/// prepended as a single developer message.
pub struct EnhancedMemory {
    store: Store,
    searcher: Arc<HybridSearcher>,
    max_results: usize,
}

impl EnhancedMemory {
    pub fn new(store: Store, searcher: Arc<HybridSearcher>, max_results: usize) -> Self {
        let max_results = if max_results == 0 { 5 } else { max_results };
        Self {
            store,
            searcher,
            max_results,
        }
    }
}

#[async_trait]
impl Memory for EnhancedMemory {
    async fn recall(&self, session_id: &str) -> Result<Vec<InputItem>> {
        self.store.load_input_history(session_id).await
    }

    async fn recall_with_context(
        &self,
        session_id: &str,
        user_message: &str,
    ) -> Result<Vec<InputItem>> {
        let items = self.store.load_input_history(session_id).await?;

        let results = match self
            .searcher
            .search(user_message, session_id, self.max_results)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "memory search failed, falling back to plain history");
                return Ok(items);
            }
        };
        if results.is_empty() {
            return Ok(items);
        }

        let mut text = String::from("[Relevant memories]\n");
        for (i, r) in results.iter().enumerate() {
            if i > 0 {
                text.push('\n');
            }
            let _ = write!(text, "- [{}] {}", r.category, r.content);
        }

        let mut augmented = Vec::with_capacity(items.len() + 1);
        augmented.push(input_message("developer", &text));
        augmented.extend(items);
        Ok(augmented)
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::embeddings::{EmbeddingProvider, vec_to_bytes};

    struct FruitEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FruitEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("apple") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }

        fn model(&self) -> &str {
            "fruit"
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn test_enhanced_recall_prepends_memories() {
        let store = Store::open_memory().await.unwrap();
        store
            .insert_memory(None, "core", "apple pie is the favourite", Some(vec_to_bytes(&[1.0, 0.0])), "h1")
            .await
            .unwrap();

        let searcher = Arc::new(HybridSearcher::new(
            store.clone(),
            Some(Arc::new(FruitEmbedder)),
            1.0,
            0.0,
        ));
        let memory = EnhancedMemory::new(store, searcher, 5);

        let items = memory.recall_with_context("s1", "tell me about apple").await.unwrap();
        assert_eq!(items[0]["role"], "developer");
        let text = items[0]["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("[Relevant memories]\n"));
        assert!(text.contains("- [core] apple pie is the favourite"));
    }

    #[tokio::test]
    async fn test_enhanced_recall_no_matches_is_plain_history() {
        let store = Store::open_memory().await.unwrap();
        let searcher = Arc::new(HybridSearcher::new(
            store.clone(),
            Some(Arc::new(FruitEmbedder)),
            1.0,
            0.0,
        ));
        let memory = EnhancedMemory::new(store, searcher, 5);

        let items = memory.recall_with_context("s1", "anything").await.unwrap();
        assert!(items.is_empty());
    }
}
