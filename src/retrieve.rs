//! Retrieval: exhaustive similarity scan with neighbor-context expansion.
//!
//! Every stored chunk embedding is compared against the query embedding with
//! cosine similarity — no approximate index, which is fine at the scale of a
//! local single-user store. Each top-k hit then pulls in its adjacent chunks
//! from the same document, and the flattened context is deduplicated while
//! preserving rank-first order.

use std::collections::HashSet;

use sqlx::{Row, SqlitePool};

use crate::embedding::{cosine_similarity, decode_embedding, EmbeddingProvider};
use crate::error::Result;
use crate::models::ScoredChunk;

/// Retrieve the context chunks most relevant to `query`.
///
/// Ranks all stored chunks by similarity descending (ties keep scan order),
/// takes the top `k`, expands each hit with the chunks of the same document
/// whose index lies within `context_radius` of it, and deduplicates the
/// result by text, first occurrence first. A store with fewer than `k`
/// chunks returns all of them; an empty store returns an empty sequence.
pub async fn retrieve_context(
    pool: &SqlitePool,
    provider: &dyn EmbeddingProvider,
    query: &str,
    k: usize,
    context_radius: i64,
) -> Result<Vec<String>> {
    let query_vec = provider.embed(query).await?;

    let hits = rank_chunks(pool, &query_vec, k).await?;

    let mut context: Vec<String> = Vec::new();
    for hit in &hits {
        context.push(hit.text.clone());

        let neighbors: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT text FROM chunks
            WHERE document_id = ? AND chunk_index BETWEEN ? AND ?
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(&hit.document_id)
        .bind(hit.chunk_index - context_radius)
        .bind(hit.chunk_index + context_radius)
        .fetch_all(pool)
        .await?;

        context.extend(neighbors);
    }

    let mut seen = HashSet::new();
    Ok(context
        .into_iter()
        .filter(|text| seen.insert(text.clone()))
        .collect())
}

/// Scan every chunk embedding, rank by cosine similarity descending, and keep
/// the top `k`. The scan reads rows in insertion order and the sort is
/// stable, so equal similarities preserve that order.
async fn rank_chunks(pool: &SqlitePool, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
    let rows = sqlx::query(
        "SELECT document_id, chunk_index, text, embedding FROM chunks ORDER BY rowid",
    )
    .fetch_all(pool)
    .await?;

    let mut scored = Vec::with_capacity(rows.len());
    for row in &rows {
        let stored: String = row.get("embedding");
        let embedding = decode_embedding(&stored)?;
        scored.push(ScoredChunk {
            document_id: row.get("document_id"),
            chunk_index: row.get("chunk_index"),
            text: row.get("text"),
            similarity: cosine_similarity(query_vec, &embedding),
        });
    }

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);

    Ok(scored)
}
