//! Writes memory records with optional embeddings.

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use crate::inference::cache::content_hash;
use crate::inference::embeddings::{EmbeddingProvider, vec_to_bytes};
use crate::persistence::Store;

/// Stores and deletes semantic memories. The content hash is recorded as a
/// dedupe hint; uniqueness is not enforced.
pub struct SemanticStore {
    store: Store,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl SemanticStore {
    pub fn new(store: Store, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self { store, embedder }
    }

    /// Persist a memory. `session_id` None means globally visible. An
    /// embedder failure stores the row with a NULL embedding rather than
    /// failing the write.
    pub async fn store(
        &self,
        session_id: Option<&str>,
        category: &str,
        content: &str,
    ) -> Result<i64> {
        let hash = content_hash(content);

        let mut embedding = None;
        if let Some(ref embedder) = self.embedder {
            match embedder.embed(&[content.to_string()]).await {
                Ok(vecs) => {
                    if let Some(v) = vecs.first() {
                        embedding = Some(vec_to_bytes(v));
                    }
                }
                Err(e) => debug!(error = %e, "embedding failed, storing memory without vector"),
            }
        }

        self.store
            .insert_memory(session_id, category, content, embedding, &hash)
            .await
    }

    /// Hard delete.
    pub async fn delete(&self, id: i64) -> Result<()> {
        self.store.delete_memory(id).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────
