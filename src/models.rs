//! Core data models for the document store.
//!
//! These types represent the documents and chunks that flow through the
//! ingestion and retrieval pipeline. A document's chunk set is always derived
//! from exactly one text snapshot; re-indexing replaces the whole set.

/// A stored document. Metadata may be updated in place; `id` and
/// `uploaded_at` are immutable after creation.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Optional origin reference. May point at a temporary file for pasted
    /// text and must not be treated as dereferenceable after ingestion.
    pub source_path: Option<String>,
    /// UTC creation timestamp, `"%Y-%m-%d %H:%M:%S"`.
    pub uploaded_at: String,
}

/// One overlapping word-window of a document, with its embedding.
///
/// `chunk_index` values are zero-based and contiguous per document. The text
/// is never empty; empty windows are dropped during chunking.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A chunk scored against a query embedding during retrieval.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub similarity: f32,
}
