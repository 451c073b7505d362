//! Hybrid memory search: FTS5 keyword ranking fused with vector cosine
//! similarity.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::inference::embeddings::{EmbeddingProvider, bytes_to_vec, cosine_similarity};
use super::state::Store;

/// Cap on the raw FTS candidate pass before fusion.
const FTS_CANDIDATE_LIMIT: usize = 50;

const DEFAULT_LIMIT: usize = 5;

/// A single memory match from hybrid search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub memory_id: i64,
    pub content: String,
    pub category: String,
    pub score: f32,
}

/// Combines FTS5 keyword search with vector cosine similarity.
///
/// The two passes are independent: either can fail (and be dropped) without
/// affecting the other, and either can be ablated via its weight. BM25 ranks
/// are normalised to `[0, 1]` before mixing — raw BM25 and cosine live on
/// different scales.
pub struct HybridSearcher {
    store: Store,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    vector_weight: f32,
    fts_weight: f32,
}

impl HybridSearcher {
    /// With no embedder, all weight shifts to the keyword pass.
    pub fn new(
        store: Store,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        vector_weight: f32,
        fts_weight: f32,
    ) -> Self {
        let (vector_weight, fts_weight) = if embedder.is_none() {
            (0.0, 1.0)
        } else {
            (vector_weight, fts_weight)
        };
        Self {
            store,
            embedder,
            vector_weight,
            fts_weight,
        }
    }

    /// Search memories visible to `session_id`, fusing both passes and
    /// returning at most `limit` results sorted by descending score.
    pub async fn search(
        &self,
        query: &str,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let limit = if limit == 0 { DEFAULT_LIMIT } else { limit };

        struct Scored {
            content: String,
            category: String,
            fts: f32,
            vec: f32,
        }
        let mut merged: HashMap<i64, Scored> = HashMap::new();

        match self.fts_pass(query, session_id).await {
            Ok(results) => {
                for r in results {
                    merged.insert(
                        r.memory_id,
                        Scored {
                            content: r.content,
                            category: r.category,
                            fts: r.score,
                            vec: 0.0,
                        },
                    );
                }
            }
            Err(e) => debug!(error = %e, "fts search error"),
        }

        if let Some(embedder) = self.embedder.clone() {
            match self.vector_pass(&*embedder, query, session_id).await {
                Ok(results) => {
                    for r in results {
                        merged
                            .entry(r.memory_id)
                            .and_modify(|s| s.vec = r.score)
                            .or_insert(Scored {
                                content: r.content,
                                category: r.category,
                                fts: 0.0,
                                vec: r.score,
                            });
                    }
                }
                Err(e) => debug!(error = %e, "vector search error"),
            }
        }

        let mut results: Vec<SearchResult> = merged
            .into_iter()
            .map(|(id, s)| SearchResult {
                memory_id: id,
                content: s.content,
                category: s.category,
                score: self.vector_weight * s.vec + self.fts_weight * s.fts,
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);
        Ok(results)
    }

    /// FTS5 MATCH with BM25 ranking, negated and min-max normalised to
    /// `[0, 1]` across the candidate rows. Session visibility is enforced
    /// inside the MATCH query, before the candidate cap.
    async fn fts_pass(&self, query: &str, session_id: &str) -> Result<Vec<SearchResult>> {
        let match_expr = escape_fts_query(query);
        let candidates = self
            .store
            .fts_match(&match_expr, session_id, FTS_CANDIDATE_LIMIT)
            .await?;

        struct Raw {
            id: i64,
            content: String,
            category: String,
            rank: f32,
        }
        let mut raws: Vec<Raw> = Vec::new();
        for (memory_id, rank) in candidates {
            let Some(memory) = self.store.get_memory(memory_id).await? else {
                continue;
            };
            // BM25 is negative, more negative = better; flip so larger = better.
            raws.push(Raw {
                id: memory.id,
                content: memory.content,
                category: memory.category,
                rank: -(rank as f32),
            });
        }

        let min = raws.iter().map(|r| r.rank).fold(f32::INFINITY, f32::min);
        let max = raws.iter().map(|r| r.rank).fold(f32::NEG_INFINITY, f32::max);
        let span = max - min;

        Ok(raws
            .into_iter()
            .map(|r| SearchResult {
                memory_id: r.id,
                content: r.content,
                category: r.category,
                score: if span > 0.0 { (r.rank - min) / span } else { 1.0 },
            })
            .collect())
    }

    /// Embed the query and scan every visible embedded memory; keep rows
    /// with positive cosine similarity. No pre-filtering shortcut — the full
    /// visible set is small enough to scan.
    async fn vector_pass(
        &self,
        embedder: &dyn EmbeddingProvider,
        query: &str,
        session_id: &str,
    ) -> Result<Vec<SearchResult>> {
        let vecs = embedder.embed(&[query.to_string()]).await?;
        let Some(query_vec) = vecs.first().filter(|v| !v.is_empty()) else {
            return Ok(Vec::new());
        };

        let memories = self.store.memories_with_embedding(session_id).await?;
        let mut results = Vec::new();
        for m in memories {
            let Some(bytes) = m.embedding else { continue };
            let score = cosine_similarity(query_vec, &bytes_to_vec(&bytes));
            if score > 0.0 {
                results.push(SearchResult {
                    memory_id: m.id,
                    content: m.content,
                    category: m.category,
                    score,
                });
            }
        }
        Ok(results)
    }
}

/// Quote each term so FTS5 operators (`"`, `*`, AND, OR, NOT, ...) are
/// treated as plain text. A `"` inside a term is doubled.
fn escape_fts_query(query: &str) -> String {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        query.to_string()
    } else {
        terms.join(" ")
    }
}

// ─── Tests ───────────────────────────────────────────────────────
