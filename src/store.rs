//! Document store: ingestion, re-indexing, metadata, and deletion.
//!
//! Each document owns a contiguous, zero-based run of chunks derived from a
//! single text snapshot. Ingestion and re-indexing compute every embedding
//! before opening a transaction, then apply the row writes as one atomic
//! commit — an interrupted operation never leaves a document with a partial
//! chunk set. Re-indexing is delete-then-insert under a per-document lock;
//! there is no incremental chunk update path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::embedding::{encode_embedding, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::{Chunk, Document};

const DIMS_KEY: &str = "embedding_dims";

/// Text source for a re-index: fresh text, a fresh file, or (when `None` is
/// passed) the document's previously stored path.
#[derive(Debug, Clone)]
pub enum ReindexSource {
    Text(String),
    File(PathBuf),
}

pub struct DocumentStore {
    pool: SqlitePool,
    // One lock per document id so concurrent re-indexes of the same document
    // cannot interleave their delete-then-insert phases.
    reindex_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            reindex_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Ingest a text as a new document.
    ///
    /// Chunks the text, obtains one embedding per chunk (sequentially), and
    /// inserts the document row together with all chunk rows in a single
    /// transaction. The title defaults to the source file name, or
    /// `"pasted_text"` when no source is given.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for empty or whitespace-only text — no document
    /// row is created. Provider and storage failures propagate unchanged.
    pub async fn ingest(
        &self,
        text: &str,
        title: Option<&str>,
        source_path: Option<&str>,
        window_size: usize,
        overlap: usize,
        provider: &dyn EmbeddingProvider,
    ) -> Result<(String, usize)> {
        if text.trim().is_empty() {
            return Err(Error::Validation("no text provided".to_string()));
        }

        let title = match title {
            Some(t) => t.to_string(),
            None => source_path
                .map(file_name_of)
                .unwrap_or_else(|| "pasted_text".to_string()),
        };

        let chunks = chunk_text(text, window_size, overlap)?;
        let embeddings = self.embed_all(&chunks, provider).await?;

        let document = Document {
            id: Uuid::new_v4().to_string(),
            title,
            source_path: source_path.map(str::to_string),
            uploaded_at: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        let records = chunk_records(&document.id, chunks, embeddings);

        let mut tx = self.pool.begin().await?;
        self.check_dims(&mut tx, &records).await?;

        sqlx::query("INSERT INTO documents (id, title, path, uploaded_at) VALUES (?, ?, ?, ?)")
            .bind(&document.id)
            .bind(&document.title)
            .bind(&document.source_path)
            .bind(&document.uploaded_at)
            .execute(&mut *tx)
            .await?;

        insert_chunks(&mut tx, &records).await?;
        tx.commit().await?;

        Ok((document.id, records.len()))
    }

    /// Ingest a text file as a new document.
    ///
    /// The file path is recorded as the document's source so a later
    /// `reindex` without a fresh source can re-read it.
    pub async fn ingest_file(
        &self,
        path: &Path,
        title: Option<&str>,
        window_size: usize,
        overlap: usize,
        provider: &dyn EmbeddingProvider,
    ) -> Result<(String, usize)> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::source_unavailable(path, e))?;

        self.ingest(
            &text,
            title,
            Some(&path.to_string_lossy()),
            window_size,
            overlap,
            provider,
        )
        .await
    }

    /// Replace a document's entire chunk set from a new text snapshot.
    ///
    /// Resolves the text from `source`, or from the document's stored path
    /// when `source` is `None`. The whole resolve→chunk→embed→swap sequence
    /// holds the document's lock; the delete of the old chunk set and the
    /// insert of the new one are a single transaction. The document row
    /// itself (id, title, path, uploaded_at) is not touched.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id, [`Error::SourceUnavailable`]
    /// when the resolved source cannot be read.
    pub async fn reindex(
        &self,
        document_id: &str,
        source: Option<ReindexSource>,
        window_size: usize,
        overlap: usize,
        provider: &dyn EmbeddingProvider,
    ) -> Result<usize> {
        let lock = self.document_lock(document_id).await;
        let _guard = lock.lock().await;

        let stored_path: Option<Option<String>> =
            sqlx::query_scalar("SELECT path FROM documents WHERE id = ?")
                .bind(document_id)
                .fetch_optional(&self.pool)
                .await?;

        let stored_path = match stored_path {
            Some(p) => p,
            None => return Err(Error::NotFound(document_id.to_string())),
        };

        let text = match source {
            Some(ReindexSource::Text(text)) => text,
            Some(ReindexSource::File(path)) => std::fs::read_to_string(&path)
                .map_err(|e| Error::source_unavailable(path, e))?,
            None => {
                let path = stored_path.ok_or_else(|| Error::SourceUnavailable {
                    path: PathBuf::new(),
                    reason: "document has no stored source path".to_string(),
                })?;
                std::fs::read_to_string(&path)
                    .map_err(|e| Error::source_unavailable(path, e))?
            }
        };

        if text.trim().is_empty() {
            return Err(Error::Validation("no text provided".to_string()));
        }

        let chunks = chunk_text(&text, window_size, overlap)?;
        let embeddings = self.embed_all(&chunks, provider).await?;
        let records = chunk_records(document_id, chunks, embeddings);

        let mut tx = self.pool.begin().await?;
        self.check_dims(&mut tx, &records).await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        insert_chunks(&mut tx, &records).await?;
        tx.commit().await?;

        Ok(records.len())
    }

    /// Update a document's title and/or source path in place.
    ///
    /// Returns `false` without touching the database when neither field is
    /// supplied or the id does not exist. Chunks are never affected.
    pub async fn update_metadata(
        &self,
        document_id: &str,
        title: Option<&str>,
        source_path: Option<&str>,
    ) -> Result<bool> {
        let result = match (title, source_path) {
            (None, None) => return Ok(false),
            (Some(t), None) => {
                sqlx::query("UPDATE documents SET title = ? WHERE id = ?")
                    .bind(t)
                    .bind(document_id)
                    .execute(&self.pool)
                    .await?
            }
            (None, Some(p)) => {
                sqlx::query("UPDATE documents SET path = ? WHERE id = ?")
                    .bind(p)
                    .bind(document_id)
                    .execute(&self.pool)
                    .await?
            }
            (Some(t), Some(p)) => {
                sqlx::query("UPDATE documents SET title = ?, path = ? WHERE id = ?")
                    .bind(t)
                    .bind(p)
                    .bind(document_id)
                    .execute(&self.pool)
                    .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }

    /// List stored documents as `"{title} ({id})"` display labels mapped to
    /// their ids, for selection UIs.
    pub async fn list_documents(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT id, title FROM documents")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let id: String = row.get("id");
                let title: String = row.get("title");
                (format!("{} ({})", title, id), id)
            })
            .collect())
    }

    /// Delete a document; its chunks go with it (cascade).
    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(document_id.to_string()));
        }
        Ok(())
    }

    /// One provider call per chunk, in chunk order. Any failure aborts the
    /// whole operation — a zero vector is never substituted.
    async fn embed_all(
        &self,
        chunks: &[String],
        provider: &dyn EmbeddingProvider,
    ) -> Result<Vec<Vec<f32>>> {
        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let vec = provider.embed(chunk).await?;
            if let Some(first) = embeddings.first() {
                let expected = first.len();
                if vec.len() != expected {
                    return Err(Error::Provider(format!(
                        "provider returned vectors of mixed lengths ({} vs {})",
                        vec.len(),
                        expected
                    )));
                }
            }
            embeddings.push(vec);
        }
        Ok(embeddings)
    }

    /// Enforce a single embedding dimensionality per store: the first write
    /// records the length, every later write must match it.
    async fn check_dims(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        records: &[Chunk],
    ) -> Result<()> {
        let dims = match records.first() {
            Some(c) => c.embedding.len(),
            None => return Ok(()),
        };

        let recorded: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = ?")
                .bind(DIMS_KEY)
                .fetch_optional(&mut **tx)
                .await?;

        match recorded.and_then(|v| v.parse::<usize>().ok()) {
            Some(existing) if existing != dims => Err(Error::Provider(format!(
                "embedding length {} does not match this store's recorded length {}",
                dims, existing
            ))),
            Some(_) => Ok(()),
            None => {
                sqlx::query("INSERT INTO store_meta (key, value) VALUES (?, ?)")
                    .bind(DIMS_KEY)
                    .bind(dims.to_string())
                    .execute(&mut **tx)
                    .await?;
                Ok(())
            }
        }
    }

    async fn document_lock(&self, document_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.reindex_locks.lock().await;
        locks
            .entry(document_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Pair chunk texts with their embeddings as storable records, assigning
/// contiguous zero-based indices.
fn chunk_records(document_id: &str, chunks: Vec<String>, embeddings: Vec<Vec<f32>>) -> Vec<Chunk> {
    chunks
        .into_iter()
        .zip(embeddings)
        .enumerate()
        .map(|(idx, (text, embedding))| Chunk {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            chunk_index: idx as i64,
            text,
            embedding,
        })
        .collect()
}

async fn insert_chunks(tx: &mut Transaction<'_, Sqlite>, records: &[Chunk]) -> Result<()> {
    for chunk in records {
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, text, embedding) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(encode_embedding(&chunk.embedding))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn file_name_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::{db, migrate};
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Deterministic provider: folds byte values into a fixed-length vector.
    struct MockProvider {
        dims: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for MockProvider {
        fn model_name(&self) -> &str {
            "mock"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut v = vec![0.0f32; self.dims];
            for (i, b) in text.bytes().enumerate() {
                v[i % self.dims] += b as f32;
            }
            Ok(v)
        }
    }

    /// Provider that fails after `ok_calls` successful embeddings.
    struct FlakyProvider {
        dims: usize,
        ok_calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn model_name(&self) -> &str {
            "flaky"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            use std::sync::atomic::Ordering;
            let remaining = self.ok_calls.load(Ordering::SeqCst);
            if remaining == 0 {
                return Err(Error::Provider("model went away".to_string()));
            }
            self.ok_calls.store(remaining - 1, Ordering::SeqCst);
            MockProvider { dims: self.dims }.embed(text).await
        }
    }

    async fn test_store() -> (TempDir, DocumentStore) {
        let tmp = TempDir::new().unwrap();
        let config = Config::minimal(tmp.path().join("rag.sqlite"));
        migrate::run_migrations(&config).await.unwrap();
        let pool = db::connect(&config).await.unwrap();
        (tmp, DocumentStore::new(pool))
    }

    async fn chunk_rows(store: &DocumentStore, doc_id: &str) -> Vec<(i64, String)> {
        sqlx::query("SELECT chunk_index, text FROM chunks WHERE document_id = ? ORDER BY chunk_index")
            .bind(doc_id)
            .fetch_all(store.pool())
            .await
            .unwrap()
            .iter()
            .map(|row| (row.get("chunk_index"), row.get("text")))
            .collect()
    }

    #[tokio::test]
    async fn test_ingest_creates_document_and_chunks() {
        let (_tmp, store) = test_store().await;
        let provider = MockProvider { dims: 8 };

        let (doc_id, count) = store
            .ingest("a b c d e f g h", Some("letters"), None, 3, 1, &provider)
            .await
            .unwrap();

        assert_eq!(count, 4);
        let rows = chunk_rows(&store, &doc_id).await;
        assert_eq!(
            rows,
            vec![
                (0, "a b c".to_string()),
                (1, "c d e".to_string()),
                (2, "e f g".to_string()),
                (3, "g h".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_ingest_empty_text_rejected_without_rows() {
        let (_tmp, store) = test_store().await;
        let provider = MockProvider { dims: 8 };

        let err = store
            .ingest("   \n  ", None, None, 3, 1, &provider)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(docs, 0);
    }

    #[tokio::test]
    async fn test_ingest_provider_failure_rolls_back_everything() {
        let (_tmp, store) = test_store().await;
        let provider = FlakyProvider {
            dims: 8,
            ok_calls: std::sync::atomic::AtomicUsize::new(2),
        };

        let err = store
            .ingest("a b c d e f g h", None, None, 3, 1, &provider)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(_)));

        let docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(store.pool())
            .await
            .unwrap();
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!((docs, chunks), (0, 0));
    }

    #[tokio::test]
    async fn test_ingest_title_defaults() {
        let (_tmp, store) = test_store().await;
        let provider = MockProvider { dims: 8 };

        let (id_pasted, _) = store
            .ingest("some pasted words", None, None, 10, 2, &provider)
            .await
            .unwrap();
        let (id_sourced, _) = store
            .ingest("other words", None, Some("/docs/notes.txt"), 10, 2, &provider)
            .await
            .unwrap();

        let titles: HashMap<String, String> = sqlx::query("SELECT id, title FROM documents")
            .fetch_all(store.pool())
            .await
            .unwrap()
            .iter()
            .map(|r| (r.get("id"), r.get("title")))
            .collect();

        assert_eq!(titles[&id_pasted], "pasted_text");
        assert_eq!(titles[&id_sourced], "notes.txt");
    }

    #[tokio::test]
    async fn test_reindex_replaces_chunk_set() {
        let (_tmp, store) = test_store().await;
        let provider = MockProvider { dims: 8 };

        let (doc_id, first_count) = store
            .ingest("a b c d e f g h", Some("doc"), None, 3, 1, &provider)
            .await
            .unwrap();
        assert_eq!(first_count, 4);

        let new_count = store
            .reindex(
                &doc_id,
                Some(ReindexSource::Text("x y z".to_string())),
                3,
                1,
                &provider,
            )
            .await
            .unwrap();
        assert_eq!(new_count, 1);

        // Exactly one contiguous run [0, chunk_count), zero leftover rows.
        let rows = chunk_rows(&store, &doc_id).await;
        assert_eq!(rows, vec![(0, "x y z".to_string())]);

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_reindex_unknown_document() {
        let (_tmp, store) = test_store().await;
        let provider = MockProvider { dims: 8 };

        let err = store
            .reindex(
                "no-such-id",
                Some(ReindexSource::Text("a b".to_string())),
                3,
                1,
                &provider,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reindex_without_source_or_stored_path() {
        let (_tmp, store) = test_store().await;
        let provider = MockProvider { dims: 8 };

        let (doc_id, _) = store
            .ingest("pasted words here", None, None, 3, 1, &provider)
            .await
            .unwrap();

        let err = store
            .reindex(&doc_id, None, 3, 1, &provider)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_reindex_from_stored_path() {
        let (tmp, store) = test_store().await;
        let provider = MockProvider { dims: 8 };

        let file = tmp.path().join("notes.txt");
        std::fs::write(&file, "first version of the notes").unwrap();

        let (doc_id, _) = store
            .ingest_file(&file, None, 3, 1, &provider)
            .await
            .unwrap();

        std::fs::write(&file, "second version").unwrap();
        let count = store.reindex(&doc_id, None, 3, 1, &provider).await.unwrap();
        assert_eq!(count, 1);

        let rows = chunk_rows(&store, &doc_id).await;
        assert_eq!(rows[0].1, "second version");
    }

    #[tokio::test]
    async fn test_reindex_missing_file() {
        let (_tmp, store) = test_store().await;
        let provider = MockProvider { dims: 8 };

        let (doc_id, _) = store
            .ingest("words", None, Some("/nowhere/gone.txt"), 3, 1, &provider)
            .await
            .unwrap();

        let err = store
            .reindex(&doc_id, None, 3, 1, &provider)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_update_metadata() {
        let (_tmp, store) = test_store().await;
        let provider = MockProvider { dims: 8 };

        let (doc_id, _) = store
            .ingest("words to keep", Some("old title"), None, 3, 1, &provider)
            .await
            .unwrap();

        assert!(store
            .update_metadata(&doc_id, Some("new title"), None)
            .await
            .unwrap());

        let title: String = sqlx::query_scalar("SELECT title FROM documents WHERE id = ?")
            .bind(&doc_id)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(title, "new title");

        // Chunks untouched
        assert_eq!(chunk_rows(&store, &doc_id).await.len(), 1);

        // No fields, or unknown id: no-op
        assert!(!store.update_metadata(&doc_id, None, None).await.unwrap());
        assert!(!store
            .update_metadata("no-such-id", Some("t"), None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_chunks() {
        let (_tmp, store) = test_store().await;
        let provider = MockProvider { dims: 8 };

        let (doc_id, _) = store
            .ingest("a b c d e f g h", None, None, 3, 1, &provider)
            .await
            .unwrap();

        store.delete_document(&doc_id).await.unwrap();

        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(chunks, 0);

        let err = store.delete_document(&doc_id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_documents_labels() {
        let (_tmp, store) = test_store().await;
        let provider = MockProvider { dims: 8 };

        let (doc_id, _) = store
            .ingest("words", Some("notes"), None, 3, 1, &provider)
            .await
            .unwrap();

        let docs = store.list_documents().await.unwrap();
        let label = format!("notes ({})", doc_id);
        assert_eq!(docs.get(&label), Some(&doc_id));
    }

    #[tokio::test]
    async fn test_mixed_embedding_lengths_rejected() {
        let (_tmp, store) = test_store().await;

        store
            .ingest("first document words", None, None, 3, 1, &MockProvider { dims: 8 })
            .await
            .unwrap();

        let err = store
            .ingest("second document words", None, None, 3, 1, &MockProvider { dims: 4 })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(_)));

        // The rejected ingest left nothing behind.
        let docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(docs, 1);
    }
}
