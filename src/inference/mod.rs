pub mod cache;
pub mod embeddings;
pub mod provider;

pub use cache::CachedEmbedder;
pub use embeddings::{EmbeddingProvider, OpenAiEmbedder};
pub use provider::{ChatResponse, FunctionCall, InputItem, OpenAiProvider, Provider, ToolDef};
