//! Embedding providers and the packed-vector codec used for BLOB storage.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// Generates vector embeddings for text. Implementations must preserve
/// input order: `embed(texts)[i]` is the vector for `texts[i]`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn model(&self) -> &str;
    fn dimensions(&self) -> usize;
}

// ─── OpenAI-compatible provider ──────────────────────────────────

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    index: usize,
    embedding: Vec<f32>,
}

/// Talks to an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(base_url: &str, api_key: &str, model: &str, dimensions: usize) -> Result<Self> {
        let base = if base_url.is_empty() {
            "https://api.openai.com/v1"
        } else {
            base_url
        };
        let client = reqwest::Client::builder()
            .timeout(EMBED_TIMEOUT)
            .build()
            .with_context(|| "failed to build embeddings HTTP client")?;
        Ok(Self {
            client,
            url: format!("{}/embeddings", base.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
            dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let req = EmbedRequest {
            model: &self.model,
            input: texts,
            dimensions: (self.dimensions > 0).then_some(self.dimensions),
        };

        let mut builder = self.client.post(&self.url).json(&req);
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let resp = builder
            .send()
            .await
            .with_context(|| "embedding request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("embedding API returned {status}: {body}");
        }

        let parsed: EmbedResponse = resp
            .json()
            .await
            .with_context(|| "embedding response parse failed")?;

        // The API may reorder `data`; restore input order via each entry's index.
        let mut result = vec![Vec::new(); texts.len()];
        for entry in parsed.data {
            if entry.index >= texts.len() {
                anyhow::bail!("embedding index {} out of range", entry.index);
            }
            result[entry.index] = entry.embedding;
        }
        if result.iter().any(|v| v.is_empty()) {
            anyhow::bail!(
                "embedding count mismatch: sent {} texts, got incomplete result",
                texts.len()
            );
        }
        Ok(result)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ─── Vector codec + similarity ───────────────────────────────────

/// Pack an f32 vector into little-endian bytes for BLOB storage.
pub fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(v.len() * 4);
    for &f in v {
        buf.extend_from_slice(&f.to_le_bytes());
    }
    buf
}

/// Unpack little-endian bytes back into an f32 vector. Trailing bytes that
/// do not form a full float are ignored.
pub fn bytes_to_vec(b: &[u8]) -> Vec<f32> {
    b.chunks_exact(4)
        .map(|chunk| {
            let arr: [u8; 4] = chunk.try_into().expect("4-byte chunk");
            f32::from_le_bytes(arr)
        })
        .collect()
}

/// Cosine similarity between two vectors. Returns 0 for mismatched lengths
/// or zero-magnitude inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for i in 0..a.len() {
        let (x, y) = (a[i] as f64, b[i] as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (dot / denom) as f32
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_round_trip() {
        let v = vec![0.0f32, 1.5, -3.25, f32::MIN, f32::MAX, 1e-38];
        let bytes = vec_to_bytes(&v);
        assert_eq!(bytes.len(), v.len() * 4);
        assert_eq!(bytes_to_vec(&bytes), v);
    }

    #[test]
    fn test_bytes_to_vec_ignores_trailing() {
        let mut bytes = vec_to_bytes(&[1.0, 2.0]);
        bytes.push(0xFF);
        assert_eq!(bytes_to_vec(&bytes), vec![1.0, 2.0]);
    }

    #[test]
    fn test_cosine_similarity_basic() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_degenerate() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
