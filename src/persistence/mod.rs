pub mod schema;
pub mod search;
pub mod state;

pub use schema::{EmbeddingCacheRow, MemoryRow, SessionRow, TurnRow};
pub use search::{HybridSearcher, SearchResult};
pub use state::Store;
