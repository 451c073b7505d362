//! Content-addressed embedding cache backed by the SQLite store.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

use crate::persistence::Store;
use super::embeddings::{EmbeddingProvider, bytes_to_vec, vec_to_bytes};

const DEFAULT_CACHE_SIZE: usize = 10_000;

/// Wraps an embedding provider with SHA-256 content-addressed caching.
///
/// A lookup error for one text degrades that text to a cache miss; only an
/// error from the inner provider aborts the whole batch. Cache writes and
/// pruning are best-effort.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    store: Store,
    cache_size: usize,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, store: Store, cache_size: usize) -> Self {
        let cache_size = if cache_size == 0 {
            DEFAULT_CACHE_SIZE
        } else {
            cache_size
        };
        Self {
            inner,
            store,
            cache_size,
        }
    }
}

/// Hex SHA-256 of the text, the cache key.
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("{digest:x}")
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<usize> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let hash = content_hash(text);
            match self.store.get_embedding_cache(&hash).await {
                Ok(Some(row)) => results[i] = Some(bytes_to_vec(&row.embedding)),
                Ok(None) => misses.push(i),
                Err(e) => {
                    debug!(error = %e, "embedding cache lookup error");
                    misses.push(i);
                }
            }
        }

        if misses.is_empty() {
            return Ok(results.into_iter().flatten().collect());
        }

        // One batched call for all misses, preserving each miss's original
        // index so the result slice aligns with the input order.
        let miss_texts: Vec<String> = misses.iter().map(|&i| texts[i].clone()).collect();
        let embeddings = self.inner.embed(&miss_texts).await?;
        if embeddings.len() != miss_texts.len() {
            anyhow::bail!(
                "embedder returned {} vectors for {} texts",
                embeddings.len(),
                miss_texts.len()
            );
        }

        let model = self.inner.model().to_string();
        for (slot, embedding) in misses.iter().zip(embeddings) {
            let hash = content_hash(&texts[*slot]);
            if let Err(e) = self
                .store
                .upsert_embedding_cache(&hash, &model, &vec_to_bytes(&embedding))
                .await
            {
                debug!(error = %e, "embedding cache store error");
            }
            results[*slot] = Some(embedding);
        }

        if let Err(e) = self.store.prune_embedding_cache(self.cache_size).await {
            debug!(error = %e, "embedding cache prune error");
        }

        Ok(results.into_iter().flatten().collect())
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts inner calls; embeds each text as [len, 1.0].
    struct CountingEmbedder {
        calls: AtomicUsize,
        texts_embedded: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                texts_embedded: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn model(&self) -> &str {
            "counting"
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        let h = content_hash("hello");
        assert_eq!(h.len(), 64);
        assert_eq!(
            h,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(content_hash("hello"), h);
        assert_ne!(content_hash("hello!"), h);
    }

    #[tokio::test]
    async fn test_second_call_hits_cache() {
        let store = Store::open_memory().await.unwrap();
        let inner = Arc::new(CountingEmbedder::new());
        let cached = CachedEmbedder::new(inner.clone(), store, 100);

        let texts = vec!["apple".to_string()];
        let first = cached.embed(&texts).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        let second = cached.embed(&texts).await.unwrap();
        // Same vector, no second inner invocation.
        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_partial_hits_batch_only_misses() {
        let store = Store::open_memory().await.unwrap();
        let inner = Arc::new(CountingEmbedder::new());
        let cached = CachedEmbedder::new(inner.clone(), store, 100);

        cached.embed(&["apple".to_string()]).await.unwrap();
        assert_eq!(inner.texts_embedded.load(Ordering::SeqCst), 1);

        let result = cached
            .embed(&[
                "pear".to_string(),
                "apple".to_string(),
                "plum".to_string(),
            ])
            .await
            .unwrap();
        // Only the two misses went to the inner provider.
        assert_eq!(inner.texts_embedded.load(Ordering::SeqCst), 3);
        // Result order follows input order, not miss order.
        assert_eq!(result[0], vec![4.0, 1.0]); // "pear"
        assert_eq!(result[1], vec![5.0, 1.0]); // "apple"
        assert_eq!(result[2], vec![4.0, 1.0]); // "plum"
    }

    #[tokio::test]
    async fn test_prune_keeps_cache_bounded() {
        let store = Store::open_memory().await.unwrap();
        let inner = Arc::new(CountingEmbedder::new());
        let cached = CachedEmbedder::new(inner, store.clone(), 3);

        for word in ["a", "bb", "ccc", "dddd", "eeeee"] {
            cached.embed(&[word.to_string()]).await.unwrap();
        }
        assert!(store.count_embedding_cache().await.unwrap() <= 3);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let store = Store::open_memory().await.unwrap();
        let cached = CachedEmbedder::new(Arc::new(CountingEmbedder::new()), store, 10);
        assert!(cached.embed(&[]).await.unwrap().is_empty());
    }
}
