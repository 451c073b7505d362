//! SQLite-backed store for pingu.
//!
//! Persists sessions, turns (verbatim model reply payloads), semantic
//! memories, and the embedding cache. Schema definitions live in
//! [`super::schema`]; hybrid memory search in [`super::search`].

use anyhow::{Context, Result};
use tracing::warn;
use turso::{Connection, Database};
use std::sync::Arc;

use crate::config::expand_home;
use crate::inference::provider::{ChatResponse, InputItem, input_message, output_to_input};
use super::schema::*;

/// The store manages all pingu persistence.
///
/// It holds the database engine and spawns connections on demand, so it can
/// be cheaply cloned and shared across tasks.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
    fts_available: bool,
}

impl Store {
    /// Open or create a store at the given path. A leading `~/` expands to
    /// the home directory; parent directories are created as needed.
    pub async fn open(db_path: &str) -> Result<Self> {
        let path = expand_home(db_path);
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory: {}", parent.display())
            })?;
        }

        let path_str = path.to_string_lossy();
        let db = turso::Builder::new_local(&path_str)
            .build()
            .await
            .with_context(|| format!("failed to open database: {path_str}"))?;

        Self::init(db).await
    }

    /// Open an in-memory store (useful for testing).
    pub async fn open_memory() -> Result<Self> {
        let db = turso::Builder::new_local(":memory:")
            .build()
            .await
            .with_context(|| "failed to open in-memory database")?;
        Self::init(db).await
    }

    async fn init(db: Database) -> Result<Self> {
        let conn = db.connect()?;

        conn.execute("PRAGMA journal_mode = WAL;", ()).await.ok();
        conn.execute("PRAGMA busy_timeout = 5000;", ()).await.ok();
        conn.execute("PRAGMA foreign_keys = ON;", ()).await.ok();

        conn.execute_batch(INIT_SCHEMA_CORE)
            .await
            .with_context(|| "failed to initialize core schema")?;

        // FTS schema may fail when the FTS5 module is missing; keyword
        // search degrades rather than aborting startup.
        let fts_available = match conn.execute_batch(INIT_SCHEMA_FTS).await {
            Ok(()) => true,
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("no such module") {
                    warn!("FTS5 module unavailable; keyword search degraded");
                    false
                } else {
                    return Err(anyhow::anyhow!("failed to initialize FTS schema: {e}"));
                }
            }
        };

        Ok(Self {
            db: Arc::new(db),
            fts_available,
        })
    }

    /// Whether the FTS5 shadow index was created.
    pub fn fts_available(&self) -> bool {
        self.fts_available
    }

    /// Get a fresh database connection (for advanced operations).
    pub fn connect(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| anyhow::anyhow!("failed to connect: {e}"))
    }

    // ─── Sessions ────────────────────────────────────────────────

    /// Idempotent session upsert. An existing row is left untouched.
    pub async fn ensure_session(&self, session_id: &str, channel: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO sessions (id, channel) VALUES (?1, ?2) ON CONFLICT(id) DO NOTHING",
            turso::params![session_id, channel],
        )
        .await
        .with_context(|| format!("failed to upsert session: {session_id}"))?;
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionRow>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT id, channel, summary, summary_up_to, created_at FROM sessions WHERE id = ?1",
                [session_id],
            )
            .await?;
        if let Some(row) = rows.next().await? {
            Ok(Some(SessionRow {
                id: row.get::<String>(0)?,
                channel: row.get::<String>(1)?,
                summary: row.get::<Option<String>>(2)?,
                summary_up_to: row.get::<Option<String>>(3)?,
                created_at: row.get::<String>(4)?,
            }))
        } else {
            Ok(None)
        }
    }

    pub async fn update_session_summary(
        &self,
        session_id: &str,
        summary: &str,
        summary_up_to: &str,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE sessions SET summary = ?1, summary_up_to = ?2 WHERE id = ?3",
            turso::params![summary, summary_up_to, session_id],
        )
        .await
        .with_context(|| format!("failed to update summary for session: {session_id}"))?;
        Ok(())
    }

    // ─── Turns ───────────────────────────────────────────────────

    /// Append a turn with the verbatim model reply payload.
    pub async fn save_turn(
        &self,
        session_id: &str,
        user_message: &str,
        response: &ChatResponse,
    ) -> Result<()> {
        let conn = self.connect()?;
        let model = response.model();
        conn.execute(
            "INSERT INTO turns (session_id, user_message, response_json, model) VALUES (?1, ?2, ?3, ?4)",
            turso::params![
                session_id,
                user_message,
                response.raw_json(),
                (!model.is_empty()).then(|| model.to_string()),
            ],
        )
        .await
        .with_context(|| format!("failed to insert turn for session: {session_id}"))?;
        Ok(())
    }

    pub async fn count_turns(&self, session_id: &str) -> Result<i64> {
        let conn = self.connect()?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM turns WHERE session_id = ?1", [session_id])
            .await?;
        let row = rows
            .next()
            .await?
            .with_context(|| "COUNT query returned no row")?;
        Ok(row.get::<i64>(0)?)
    }

    /// All turns for a session in id order.
    pub async fn get_turns(&self, session_id: &str) -> Result<Vec<TurnRow>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT id, session_id, user_message, response_json, model, created_at FROM turns WHERE session_id = ?1 ORDER BY id",
                [session_id],
            )
            .await?;

        let mut turns = Vec::new();
        while let Some(row) = rows.next().await? {
            turns.push(TurnRow {
                id: row.get::<i64>(0)?,
                session_id: row.get::<String>(1)?,
                user_message: row.get::<String>(2)?,
                response_json: row.get::<String>(3)?,
                model: row.get::<Option<String>>(4)?,
                created_at: row.get::<String>(5)?,
            });
        }
        Ok(turns)
    }

    /// Reconstruct the model input sequence from stored turns: for each turn
    /// in id order, the user message followed by the replayable output items
    /// of the stored payload. Turns with invalid JSON keep the user message
    /// and skip the payload with a warning.
    pub async fn load_input_history(&self, session_id: &str) -> Result<Vec<InputItem>> {
        let turns = self.get_turns(session_id).await?;

        let mut items = Vec::new();
        for turn in turns {
            items.push(input_message("user", &turn.user_message));

            let raw: serde_json::Value = match serde_json::from_str(&turn.response_json) {
                Ok(v) => v,
                Err(e) => {
                    warn!(turn_id = turn.id, error = %e, "skipping turn with invalid response JSON");
                    continue;
                }
            };
            let output = raw
                .get("output")
                .and_then(serde_json::Value::as_array)
                .cloned()
                .unwrap_or_default();
            items.extend(output_to_input(&output));
        }
        Ok(items)
    }

    // ─── Memories ────────────────────────────────────────────────

    /// Insert a memory record; returns the new id.
    pub async fn insert_memory(
        &self,
        session_id: Option<&str>,
        category: &str,
        content: &str,
        embedding: Option<Vec<u8>>,
        content_hash: &str,
    ) -> Result<i64> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO memories (session_id, category, content, embedding, content_hash) VALUES (?1, ?2, ?3, ?4, ?5)",
            turso::params![
                session_id.map(str::to_string),
                category,
                content,
                embedding,
                content_hash,
            ],
        )
        .await
        .with_context(|| "failed to insert memory")?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn delete_memory(&self, id: i64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM memories WHERE id = ?1", [id]).await?;
        Ok(())
    }

    pub async fn get_memory(&self, id: i64) -> Result<Option<MemoryRow>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT id, session_id, category, content, embedding, content_hash, created_at FROM memories WHERE id = ?1",
                [id],
            )
            .await?;
        if let Some(row) = rows.next().await? {
            Ok(Some(read_memory_row(&row)?))
        } else {
            Ok(None)
        }
    }

    /// Memories visible to `session_id` that carry an embedding.
    /// Visibility: global rows (NULL session) plus rows scoped to the session.
    pub async fn memories_with_embedding(&self, session_id: &str) -> Result<Vec<MemoryRow>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT id, session_id, category, content, embedding, content_hash, created_at \
                 FROM memories WHERE embedding IS NOT NULL AND (session_id IS NULL OR session_id = ?1)",
                [session_id],
            )
            .await?;

        let mut memories = Vec::new();
        while let Some(row) = rows.next().await? {
            memories.push(read_memory_row(&row)?);
        }
        Ok(memories)
    }

    /// Raw FTS5 MATCH pass, restricted to rows visible to `session_id`
    /// *before* the limit applies so other sessions' matches cannot starve
    /// the candidate set. Returns `(memory_id, rank)` pairs where rank is
    /// the bm25 score (negative, more negative = better). Errors when the
    /// FTS index is unavailable; callers decide whether that is fatal.
    pub async fn fts_match(
        &self,
        match_expr: &str,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<(i64, f64)>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT m.id, f.rank FROM memories_fts f \
                 JOIN memories m ON m.id = f.rowid \
                 WHERE memories_fts MATCH ?1 \
                   AND (m.session_id IS NULL OR m.session_id = ?2) \
                 ORDER BY f.rank LIMIT ?3",
                turso::params![match_expr, session_id, limit as i64],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push((row.get::<i64>(0)?, row.get::<f64>(1)?));
        }
        Ok(results)
    }

    // ─── Embedding cache ─────────────────────────────────────────

    pub async fn get_embedding_cache(&self, content_hash: &str) -> Result<Option<EmbeddingCacheRow>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT content_hash, embed_model, embedding, created_at FROM embedding_cache WHERE content_hash = ?1",
                [content_hash],
            )
            .await?;
        if let Some(row) = rows.next().await? {
            Ok(Some(EmbeddingCacheRow {
                content_hash: row.get::<String>(0)?,
                embed_model: row.get::<String>(1)?,
                embedding: row.get::<Vec<u8>>(2)?,
                created_at: row.get::<String>(3)?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Concurrent-safe by construction: replace-by-hash.
    pub async fn upsert_embedding_cache(
        &self,
        content_hash: &str,
        embed_model: &str,
        embedding: &[u8],
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO embedding_cache (content_hash, embed_model, embedding) VALUES (?1, ?2, ?3)",
            turso::params![content_hash, embed_model, embedding.to_vec()],
        )
        .await
        .with_context(|| "failed to upsert embedding cache entry")?;
        Ok(())
    }

    pub async fn count_embedding_cache(&self) -> Result<i64> {
        let conn = self.connect()?;
        let mut rows = conn.query("SELECT COUNT(*) FROM embedding_cache", ()).await?;
        let row = rows
            .next()
            .await?
            .with_context(|| "COUNT query returned no row")?;
        Ok(row.get::<i64>(0)?)
    }

    /// Delete oldest rows until at most `cap` remain.
    pub async fn prune_embedding_cache(&self, cap: usize) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM embedding_cache WHERE content_hash IN (\
                SELECT content_hash FROM embedding_cache \
                ORDER BY created_at ASC, content_hash ASC \
                LIMIT MAX(0, (SELECT COUNT(*) FROM embedding_cache) - ?1))",
            [cap as i64],
        )
        .await
        .with_context(|| "failed to prune embedding cache")?;
        Ok(())
    }
}

fn read_memory_row(row: &turso::Row) -> Result<MemoryRow> {
    Ok(MemoryRow {
        id: row.get::<i64>(0)?,
        session_id: row.get::<Option<String>>(1)?,
        category: row.get::<String>(2)?,
        content: row.get::<String>(3)?,
        embedding: row.get::<Option<Vec<u8>>>(4)?,
        content_hash: row.get::<Option<String>>(5)?,
        created_at: row.get::<String>(6)?,
    })
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::provider::ChatResponse;
    use serde_json::json;

    fn response_with_text(text: &str) -> ChatResponse {
        ChatResponse::from_value(json!({
            "model": "test-model",
            "output": [{
                "type": "message",
                "role": "assistant",
                "content": [{ "type": "output_text", "text": text }],
            }],
            "usage": { "input_tokens": 1, "output_tokens": 1 },
        }))
    }

    #[tokio::test]
    async fn test_ensure_session_idempotent() {
        let store = Store::open_memory().await.unwrap();
        store.ensure_session("s1", "default").await.unwrap();
        store.ensure_session("s1", "telegram").await.unwrap();

        let session = store.get_session("s1").await.unwrap().unwrap();
        // First writer wins; the upsert never clobbers.
        assert_eq!(session.channel, "default");
        assert!(session.summary.is_none());
    }

    #[tokio::test]
    async fn test_save_and_get_turns() {
        let store = Store::open_memory().await.unwrap();
        store.ensure_session("s1", "default").await.unwrap();

        store
            .save_turn("s1", "hello", &response_with_text("hi there"))
            .await
            .unwrap();
        store
            .save_turn("s1", "bye", &response_with_text("goodbye"))
            .await
            .unwrap();

        let turns = store.get_turns("s1").await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].user_message, "hello");
        assert_eq!(turns[1].user_message, "bye");
        assert!(turns[0].id < turns[1].id);
        assert_eq!(turns[0].model.as_deref(), Some("test-model"));
        assert_eq!(store.count_turns("s1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_load_input_history_round_trip() {
        let store = Store::open_memory().await.unwrap();
        store.ensure_session("s1", "default").await.unwrap();

        let response = response_with_text("hi there");
        store.save_turn("s1", "hello", &response).await.unwrap();

        let items = store.load_input_history("s1").await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["type"], "message");
        assert_eq!(items[0]["role"], "user");
        assert_eq!(items[0]["content"][0]["text"], "hello");
        // The stored payload's output item comes back verbatim.
        assert_eq!(&items[1], &response.output()[0]);
    }

    #[tokio::test]
    async fn test_load_input_history_skips_invalid_json() {
        let store = Store::open_memory().await.unwrap();
        store.ensure_session("s1", "default").await.unwrap();

        let conn = store.connect().unwrap();
        conn.execute(
            "INSERT INTO turns (session_id, user_message, response_json) VALUES ('s1', 'q', 'not json')",
            (),
        )
        .await
        .unwrap();

        let items = store.load_input_history("s1").await.unwrap();
        // User message survives; the broken payload is dropped.
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["content"][0]["text"], "q");
    }

    #[tokio::test]
    async fn test_session_summary_update() {
        let store = Store::open_memory().await.unwrap();
        store.ensure_session("s1", "default").await.unwrap();

        store
            .update_session_summary("s1", "talked about pie", "7")
            .await
            .unwrap();

        let session = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(session.summary.as_deref(), Some("talked about pie"));
        assert_eq!(session.summary_up_to.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_memory_insert_delete() {
        let store = Store::open_memory().await.unwrap();

        let id = store
            .insert_memory(None, "core", "user likes tea", Some(vec![0, 0, 128, 63]), "abc")
            .await
            .unwrap();
        assert!(id > 0);

        let row = store.get_memory(id).await.unwrap().unwrap();
        assert_eq!(row.category, "core");
        assert_eq!(row.content, "user likes tea");
        assert!(row.session_id.is_none());
        assert_eq!(row.embedding.as_deref(), Some(&[0u8, 0, 128, 63][..]));

        store.delete_memory(id).await.unwrap();
        assert!(store.get_memory(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memories_with_embedding_visibility() {
        let store = Store::open_memory().await.unwrap();
        let emb = Some(vec![0u8, 0, 128, 63]);

        store.insert_memory(None, "core", "global", emb.clone(), "h1").await.unwrap();
        store
            .insert_memory(Some("s1"), "conversation", "scoped to s1", emb.clone(), "h2")
            .await
            .unwrap();
        store
            .insert_memory(Some("s2"), "conversation", "scoped to s2", emb.clone(), "h3")
            .await
            .unwrap();
        // No embedding: invisible to the vector pass regardless of scope.
        store.insert_memory(None, "daily", "no vector", None, "h4").await.unwrap();

        let visible = store.memories_with_embedding("s1").await.unwrap();
        let contents: Vec<&str> = visible.iter().map(|m| m.content.as_str()).collect();
        assert!(contents.contains(&"global"));
        assert!(contents.contains(&"scoped to s1"));
        assert!(!contents.contains(&"scoped to s2"));
        assert!(!contents.contains(&"no vector"));
    }

    #[tokio::test]
    async fn test_embedding_cache_round_trip() {
        let store = Store::open_memory().await.unwrap();

        assert!(store.get_embedding_cache("h1").await.unwrap().is_none());

        store.upsert_embedding_cache("h1", "model-a", &[1, 2, 3, 4]).await.unwrap();
        let row = store.get_embedding_cache("h1").await.unwrap().unwrap();
        assert_eq!(row.embed_model, "model-a");
        assert_eq!(row.embedding, vec![1, 2, 3, 4]);

        // Replace by hash.
        store.upsert_embedding_cache("h1", "model-b", &[9, 9, 9, 9]).await.unwrap();
        let row = store.get_embedding_cache("h1").await.unwrap().unwrap();
        assert_eq!(row.embed_model, "model-b");
        assert_eq!(store.count_embedding_cache().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_embedding_cache_prune() {
        let store = Store::open_memory().await.unwrap();
        for i in 0..10 {
            store
                .upsert_embedding_cache(&format!("h{i}"), "m", &[0, 0, 0, 0])
                .await
                .unwrap();
        }
        assert_eq!(store.count_embedding_cache().await.unwrap(), 10);

        store.prune_embedding_cache(4).await.unwrap();
        assert_eq!(store.count_embedding_cache().await.unwrap(), 4);

        // Pruning below the cap is a no-op.
        store.prune_embedding_cache(100).await.unwrap();
        assert_eq!(store.count_embedding_cache().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_file_based_store_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("pingu.db");
        let db_path_str = db_path.to_str().unwrap();

        {
            let store = Store::open(db_path_str).await.unwrap();
            store.ensure_session("s1", "default").await.unwrap();
            store
                .save_turn("s1", "hello", &response_with_text("hi"))
                .await
                .unwrap();
        }
        {
            let store = Store::open(db_path_str).await.unwrap();
            assert_eq!(store.count_turns("s1").await.unwrap(), 1);
        }
    }
}
