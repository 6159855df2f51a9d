//! Memory engine: chunked full-text + vector hybrid index over one agent's
//! markdown files, with consolidation and archival maintenance.
//!
//! Each agent owns a `memory.db` holding chunk rows, an FTS5 mirror kept
//! consistent by triggers, and optional embeddings (little-endian f32
//! blobs, cascade-deleted with their chunk). Search is full-text, vector
//! (cosine), or reciprocal-rank-fusion hybrid.

mod archive;
mod chunker;
mod consolidate;
mod embedder;
mod openai_embedder;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub use archive::{archive_memory, ArchiveReport, DEFAULT_ARCHIVE_THRESHOLD};
pub use chunker::{chunk_text, Chunk, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
pub use consolidate::{consolidate, ConsolidationReport, DEFAULT_LOOKBACK_DAYS};
pub use embedder::{Embedder, HashEmbedder};
pub use openai_embedder::OpenAIEmbedder;

use crate::fsutil::now_ms;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("embedding: {0}")]
    Embedding(String),
    #[error("memory file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for MemoryError {
    fn from(e: rusqlite::Error) -> Self {
        MemoryError::Storage(e.to_string())
    }
}

/// Reciprocal Rank Fusion constant.
const RRF_K: f64 = 60.0;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;
CREATE TABLE IF NOT EXISTS memory_chunks (
    id INTEGER PRIMARY KEY,
    file_path TEXT NOT NULL,
    chunk_text TEXT NOT NULL,
    start_offset INTEGER NOT NULL,
    end_offset INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_memory_chunks_file ON memory_chunks(file_path);
CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
    chunk_text,
    content='memory_chunks',
    content_rowid='id'
);
CREATE TRIGGER IF NOT EXISTS memory_chunks_ai AFTER INSERT ON memory_chunks BEGIN
    INSERT INTO memory_fts(rowid, chunk_text) VALUES (new.id, new.chunk_text);
END;
CREATE TRIGGER IF NOT EXISTS memory_chunks_ad AFTER DELETE ON memory_chunks BEGIN
    INSERT INTO memory_fts(memory_fts, rowid, chunk_text) VALUES ('delete', old.id, old.chunk_text);
END;
CREATE TRIGGER IF NOT EXISTS memory_chunks_au AFTER UPDATE ON memory_chunks BEGIN
    INSERT INTO memory_fts(memory_fts, rowid, chunk_text) VALUES ('delete', old.id, old.chunk_text);
    INSERT INTO memory_fts(rowid, chunk_text) VALUES (new.id, new.chunk_text);
END;
CREATE TABLE IF NOT EXISTS memory_embeddings (
    chunk_id INTEGER PRIMARY KEY REFERENCES memory_chunks(id) ON DELETE CASCADE,
    vector BLOB NOT NULL,
    model TEXT NOT NULL
);
"#;

/// One retrieval hit. `rank` ascends (lower is better); vector hits carry
/// their cosine similarity, hybrid hits additionally a fused score
/// (higher is better).
#[derive(Clone, Debug)]
pub struct SearchHit {
    pub chunk_id: i64,
    pub file_path: String,
    pub text: String,
    pub rank: f64,
    pub similarity: Option<f32>,
    pub score: Option<f64>,
}

/// Outcome of an incremental reindex pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReindexReport {
    pub files_indexed: usize,
    pub files_removed: usize,
    pub files_skipped: usize,
}

/// Per-agent chunk/FTS/vector store over the agent's markdown files.
pub struct MemoryStore {
    db: Arc<Mutex<rusqlite::Connection>>,
    agent_root: PathBuf,
    embedder: Option<Arc<dyn Embedder>>,
    chunk_size: usize,
    overlap: usize,
}

impl MemoryStore {
    /// Opens or creates the per-agent database with WAL enabled.
    pub fn open(
        db_path: impl AsRef<Path>,
        agent_root: impl Into<PathBuf>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Result<Self, MemoryError> {
        let conn = rusqlite::Connection::open(db_path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn, agent_root.into(), embedder)
    }

    /// In-memory variant for tests.
    pub fn open_in_memory(
        agent_root: impl Into<PathBuf>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Result<Self, MemoryError> {
        Self::init(
            rusqlite::Connection::open_in_memory()?,
            agent_root.into(),
            embedder,
        )
    }

    fn init(
        conn: rusqlite::Connection,
        agent_root: PathBuf,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Result<Self, MemoryError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            agent_root,
            embedder,
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        })
    }

    /// Overrides the chunking window (mostly for tests).
    pub fn with_chunking(mut self, chunk_size: usize, overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.overlap = overlap;
        self
    }

    pub fn agent_root(&self) -> &Path {
        &self.agent_root
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, MemoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, MemoryError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = db.lock().map_err(|_| MemoryError::Storage("lock".into()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| MemoryError::Storage(e.to_string()))?
    }

    /// Embeds the given texts when an embedder is configured.
    async fn embed_all(
        &self,
        texts: &[String],
    ) -> Result<Option<(Vec<Vec<f32>>, String)>, MemoryError> {
        let Some(embedder) = &self.embedder else {
            return Ok(None);
        };
        if texts.is_empty() {
            return Ok(Some((Vec::new(), embedder.model().to_string())));
        }
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = embedder.embed(&refs).await?;
        Ok(Some((vectors, embedder.model().to_string())))
    }

    /// (Re)indexes one file, path relative to the agent root. Chunks for
    /// the file are deleted and reinserted in one transaction. Returns the
    /// number of chunks written.
    pub async fn index_file(&self, rel_path: &str) -> Result<usize, MemoryError> {
        let content = std::fs::read_to_string(self.agent_root.join(rel_path))?;
        self.index_content(rel_path, &content).await
    }

    /// Like [`MemoryStore::index_file`] with the content supplied directly.
    pub async fn index_content(&self, rel_path: &str, content: &str) -> Result<usize, MemoryError> {
        let chunks = chunk_text(content, self.chunk_size, self.overlap);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embedded = self.embed_all(&texts).await?;
        let rel_path = rel_path.to_string();
        let count = chunks.len();

        self.blocking(move |conn| {
            let tx = conn.transaction().map_err(MemoryError::from)?;
            write_file_chunks(&tx, &rel_path, &chunks, embedded.as_ref(), now_ms())?;
            tx.commit().map_err(MemoryError::from)?;
            Ok(())
        })
        .await?;
        Ok(count)
    }

    /// Drops all chunks (and, by trigger and cascade, FTS rows and
    /// embeddings) of one file.
    pub async fn remove_file(&self, rel_path: &str) -> Result<(), MemoryError> {
        let rel_path = rel_path.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "DELETE FROM memory_chunks WHERE file_path = ?1",
                rusqlite::params![rel_path],
            )?;
            Ok(())
        })
        .await
    }

    /// Incremental reindex: walks all `*.md` under the agent root, skips
    /// files whose mtime is not newer than their chunks, reindexes changed
    /// files, and drops chunks of files that no longer exist, all in one
    /// transaction.
    pub async fn reindex_all(&self) -> Result<ReindexReport, MemoryError> {
        // Newest chunk per indexed path.
        let indexed: HashMap<String, i64> = self
            .blocking(|conn| {
                let mut stmt = conn
                    .prepare("SELECT file_path, MAX(updated_at) FROM memory_chunks GROUP BY file_path")
                    .map_err(MemoryError::from)?;
                let mut rows = stmt.query([]).map_err(MemoryError::from)?;
                let mut out = HashMap::new();
                while let Some(row) = rows.next().map_err(MemoryError::from)? {
                    let path: String = row.get(0).map_err(MemoryError::from)?;
                    let updated: i64 = row.get(1).map_err(MemoryError::from)?;
                    out.insert(path, updated);
                }
                Ok(out)
            })
            .await?;

        let mut report = ReindexReport::default();
        let mut present: Vec<String> = Vec::new();
        let mut changed: Vec<(String, String)> = Vec::new();

        for entry in walkdir::WalkDir::new(&self.agent_root)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file()
                || entry.path().extension().and_then(|e| e.to_str()) != Some("md")
            {
                continue;
            }
            let rel = match entry.path().strip_prefix(&self.agent_root) {
                Ok(rel) => rel.to_string_lossy().into_owned(),
                Err(_) => continue,
            };
            present.push(rel.clone());

            let mtime_ms = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64)
                .unwrap_or(i64::MAX);
            match indexed.get(&rel) {
                Some(&updated) if mtime_ms <= updated => {
                    report.files_skipped += 1;
                }
                _ => {
                    let content = std::fs::read_to_string(entry.path())?;
                    changed.push((rel, content));
                }
            }
        }

        let removed: Vec<String> = indexed
            .keys()
            .filter(|path| !present.contains(path))
            .cloned()
            .collect();
        report.files_indexed = changed.len();
        report.files_removed = removed.len();

        // Chunk and embed outside the transaction; apply everything inside it.
        let mut batches: Vec<(String, Vec<Chunk>, Option<(Vec<Vec<f32>>, String)>)> = Vec::new();
        for (rel, content) in changed {
            let chunks = chunk_text(&content, self.chunk_size, self.overlap);
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let embedded = self.embed_all(&texts).await?;
            batches.push((rel, chunks, embedded));
        }

        self.blocking(move |conn| {
            let tx = conn.transaction().map_err(MemoryError::from)?;
            let stamp = now_ms();
            for path in &removed {
                tx.execute(
                    "DELETE FROM memory_chunks WHERE file_path = ?1",
                    rusqlite::params![path],
                )?;
            }
            for (rel, chunks, embedded) in &batches {
                write_file_chunks(&tx, rel, chunks, embedded.as_ref(), stamp)?;
            }
            tx.commit().map_err(MemoryError::from)?;
            Ok(())
        })
        .await?;

        Ok(report)
    }

    /// Full-text search, ordered by ascending relevance rank.
    pub async fn search_text(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, MemoryError> {
        let fts_query = build_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.file_path, c.chunk_text, memory_fts.rank
                 FROM memory_fts JOIN memory_chunks c ON c.id = memory_fts.rowid
                 WHERE memory_fts MATCH ?1
                 ORDER BY memory_fts.rank LIMIT ?2",
            )?;
            let mut rows = stmt.query(rusqlite::params![fts_query, limit as i64])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(SearchHit {
                    chunk_id: row.get(0)?,
                    file_path: row.get(1)?,
                    text: row.get(2)?,
                    rank: row.get(3)?,
                    similarity: None,
                    score: None,
                });
            }
            Ok(out)
        })
        .await
    }

    /// Vector search: cosine similarity of the query embedding against
    /// every chunk that has one. Rank is `-similarity`, so lower remains
    /// better. Empty without an embedder.
    pub async fn search_vector(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, MemoryError> {
        let Some(embedder) = &self.embedder else {
            return Ok(Vec::new());
        };
        let vectors = embedder.embed(&[query]).await?;
        let query_vec = vectors
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::Embedding("embedder returned no vector".into()))?;
        // A zero query vector has no direction to rank by.
        if query_vec.iter().all(|x| *x == 0.0) {
            return Ok(Vec::new());
        }

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT e.chunk_id, c.file_path, c.chunk_text, e.vector
                 FROM memory_embeddings e JOIN memory_chunks c ON c.id = e.chunk_id",
            )?;
            let mut rows = stmt.query([])?;
            let mut hits: Vec<SearchHit> = Vec::new();
            while let Some(row) = rows.next()? {
                let blob: Vec<u8> = row.get(3)?;
                let similarity = cosine_similarity(&query_vec, &decode_vector(&blob));
                hits.push(SearchHit {
                    chunk_id: row.get(0)?,
                    file_path: row.get(1)?,
                    text: row.get(2)?,
                    rank: -(similarity as f64),
                    similarity: Some(similarity),
                    score: None,
                });
            }
            hits.sort_by(|a, b| a.rank.partial_cmp(&b.rank).unwrap_or(std::cmp::Ordering::Equal));
            hits.truncate(limit);
            Ok(hits)
        })
        .await
    }

    /// Hybrid search: Reciprocal Rank Fusion over the top `2·limit` of the
    /// full-text and vector result lists. Combined score is
    /// `Σ 1/(k + rank + 1)` with k = 60; results descend by score. The
    /// vector similarity of a merged hit is preserved for display.
    pub async fn search_hybrid(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, MemoryError> {
        let pool = limit.saturating_mul(2).max(1);
        let text_hits = self.search_text(query, pool).await?;
        let vector_hits = self.search_vector(query, pool).await?;

        let mut merged: HashMap<i64, SearchHit> = HashMap::new();
        let mut scores: HashMap<i64, f64> = HashMap::new();

        for (rank, hit) in text_hits.into_iter().enumerate() {
            *scores.entry(hit.chunk_id).or_default() += 1.0 / (RRF_K + rank as f64 + 1.0);
            merged.entry(hit.chunk_id).or_insert(hit);
        }
        for (rank, hit) in vector_hits.into_iter().enumerate() {
            *scores.entry(hit.chunk_id).or_default() += 1.0 / (RRF_K + rank as f64 + 1.0);
            merged
                .entry(hit.chunk_id)
                .and_modify(|existing| existing.similarity = hit.similarity)
                .or_insert(hit);
        }

        let mut out: Vec<SearchHit> = merged
            .into_values()
            .map(|mut hit| {
                hit.score = scores.get(&hit.chunk_id).copied();
                hit
            })
            .collect();
        out.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out.truncate(limit);
        Ok(out)
    }

    /// Chunk and FTS row counts, for invariant checks.
    pub async fn chunk_and_fts_counts(&self) -> Result<(i64, i64), MemoryError> {
        self.blocking(|conn| {
            let chunks: i64 =
                conn.query_row("SELECT COUNT(*) FROM memory_chunks", [], |r| r.get(0))?;
            let fts: i64 = conn.query_row("SELECT COUNT(*) FROM memory_fts", [], |r| r.get(0))?;
            Ok((chunks, fts))
        })
        .await
    }
}

/// Deletes and rewrites all chunks of one file inside the caller's
/// transaction, so the chunk set for a file is always replaced atomically.
fn write_file_chunks(
    tx: &rusqlite::Transaction<'_>,
    rel_path: &str,
    chunks: &[Chunk],
    embedded: Option<&(Vec<Vec<f32>>, String)>,
    stamp: i64,
) -> Result<(), MemoryError> {
    tx.execute(
        "DELETE FROM memory_chunks WHERE file_path = ?1",
        rusqlite::params![rel_path],
    )?;
    for (i, chunk) in chunks.iter().enumerate() {
        tx.execute(
            "INSERT INTO memory_chunks (file_path, chunk_text, start_offset, end_offset, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![rel_path, chunk.text, chunk.start as i64, chunk.end as i64, stamp],
        )?;
        if let Some((vectors, model)) = embedded {
            if let Some(vector) = vectors.get(i) {
                let id = tx.last_insert_rowid();
                tx.execute(
                    "INSERT INTO memory_embeddings (chunk_id, vector, model) VALUES (?1, ?2, ?3)",
                    rusqlite::params![id, encode_vector(vector), model],
                )?;
            }
        }
    }
    Ok(())
}

/// Snapshots the current contents of `<agent_root>/<file_name>` into
/// `history/<stem>/<timestamp>.md` before an engine-driven rewrite.
/// Missing source files are a no-op.
pub(crate) fn snapshot_history(agent_root: &Path, file_name: &str) -> std::io::Result<()> {
    let source = agent_root.join(file_name);
    if !source.exists() {
        return Ok(());
    }
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let dir = agent_root.join("history").join(stem);
    std::fs::create_dir_all(&dir)?;
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f");
    std::fs::copy(&source, dir.join(format!("{}.md", stamp)))?;
    Ok(())
}

/// Builds the FTS5 query: whitespace tokens, each double-quoted with
/// internal quotes doubled, joined by spaces.
pub fn build_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Little-endian f32 encoding of an embedding vector.
pub fn encode_vector(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for f in v {
        out.extend_from_slice(&f.to_le_bytes());
    }
    out
}

pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity; zero when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for i in 0..len {
        dot += a[i] * b[i];
        na += a[i] * a[i];
        nb += b[i] * b[i];
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fts_query_quotes_tokens() {
        assert_eq!(build_fts_query("dark mode"), "\"dark\" \"mode\"");
        assert_eq!(build_fts_query("say \"hi\""), "\"say\" \"\"\"hi\"\"\"");
        assert_eq!(build_fts_query("   "), "");
    }

    #[test]
    fn vector_roundtrip_is_little_endian() {
        let v = vec![1.0f32, -0.5, 3.25];
        let bytes = encode_vector(&v);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(decode_vector(&bytes), v);
    }

    #[test]
    fn cosine_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
