//! Database schema definitions and row types for the pingu store.

// ─── Schema Constants ───────────────────────────────────────────

/// SQL statements to initialize the core database schema.
pub(crate) const INIT_SCHEMA_CORE: &str = r#"
-- Durable conversations
CREATE TABLE IF NOT EXISTS sessions (
    id            TEXT PRIMARY KEY,
    channel       TEXT NOT NULL DEFAULT 'default',
    summary       TEXT,
    summary_up_to TEXT,
    created_at    TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One user message + the verbatim model reply payload
CREATE TABLE IF NOT EXISTS turns (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id    TEXT NOT NULL REFERENCES sessions(id),
    user_message  TEXT NOT NULL,
    response_json TEXT NOT NULL,
    model         TEXT,
    created_at    TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Semantic memory records; session_id NULL = globally visible
CREATE TABLE IF NOT EXISTS memories (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id   TEXT,
    category     TEXT NOT NULL CHECK (category IN ('core', 'daily', 'conversation')),
    content      TEXT NOT NULL,
    embedding    BLOB,
    content_hash TEXT,
    created_at   TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Content-addressed embedding memoisation
CREATE TABLE IF NOT EXISTS embedding_cache (
    content_hash TEXT PRIMARY KEY,
    embed_model  TEXT NOT NULL,
    embedding    BLOB NOT NULL,
    created_at   TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id);
CREATE INDEX IF NOT EXISTS idx_memories_session ON memories(session_id);
"#;

/// FTS5 shadow index over memory content, kept in sync by triggers.
/// Applied best-effort: absence of the FTS5 module degrades keyword search.
pub(crate) const INIT_SCHEMA_FTS: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(content, content='memories', content_rowid='id');

CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
  INSERT INTO memories_fts(rowid, content) VALUES (new.id, new.content);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
  INSERT INTO memories_fts(memories_fts, rowid, content) VALUES('delete', old.id, old.content);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
  INSERT INTO memories_fts(memories_fts, rowid, content) VALUES('delete', old.id, old.content);
  INSERT INTO memories_fts(rowid, content) VALUES (new.id, new.content);
END;
"#;

// ─── Row Types ───────────────────────────────────────────────────

/// A row from the `sessions` table.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub channel: String,
    pub summary: Option<String>,
    pub summary_up_to: Option<String>,
    pub created_at: String,
}

/// A row from the `turns` table.
#[derive(Debug, Clone)]
pub struct TurnRow {
    pub id: i64,
    pub session_id: String,
    pub user_message: String,
    pub response_json: String,
    pub model: Option<String>,
    pub created_at: String,
}

/// A row from the `memories` table.
#[derive(Debug, Clone)]
pub struct MemoryRow {
    pub id: i64,
    pub session_id: Option<String>,
    pub category: String,
    pub content: String,
    pub embedding: Option<Vec<u8>>,
    pub content_hash: Option<String>,
    pub created_at: String,
}

/// A row from the `embedding_cache` table.
#[derive(Debug, Clone)]
pub struct EmbeddingCacheRow {
    pub content_hash: String,
    pub embed_model: String,
    pub embedding: Vec<u8>,
    pub created_at: String,
}
