//! Bulk export of the store's tables.
//!
//! Two operational paths: a JSON dump of both tables to a file or stdout,
//! and `push`, which republishes the rows to an external HTTP store in
//! fixed-size batches with bounded retry. Neither touches the retrieval
//! core; a batch that exhausts its retries is skipped with a warning rather
//! than aborting the run.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::error::{Error, Result};

#[derive(Serialize)]
struct ExportData {
    documents: Vec<ExportDocument>,
    chunks: Vec<ExportChunk>,
}

#[derive(Serialize, Clone)]
struct ExportDocument {
    id: String,
    title: String,
    path: Option<String>,
    uploaded_at: String,
}

#[derive(Serialize, Clone)]
struct ExportChunk {
    id: String,
    document_id: String,
    chunk_index: i64,
    text: String,
    embedding: String,
}

async fn fetch_documents(pool: &SqlitePool) -> Result<Vec<ExportDocument>> {
    let rows = sqlx::query("SELECT id, title, path, uploaded_at FROM documents ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| ExportDocument {
            id: row.get("id"),
            title: row.get("title"),
            path: row.get("path"),
            uploaded_at: row.get("uploaded_at"),
        })
        .collect())
}

async fn fetch_chunks(pool: &SqlitePool) -> Result<Vec<ExportChunk>> {
    let rows = sqlx::query(
        "SELECT id, document_id, chunk_index, text, embedding \
         FROM chunks ORDER BY document_id, chunk_index",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ExportChunk {
            id: row.get("id"),
            document_id: row.get("document_id"),
            chunk_index: row.get("chunk_index"),
            text: row.get("text"),
            embedding: row.get("embedding"),
        })
        .collect())
}

/// Export documents and chunks as JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let pool = db::connect(config).await?;

    let documents = fetch_documents(&pool).await?;
    let chunks = fetch_chunks(&pool).await?;
    let doc_count = documents.len();
    let chunk_count = chunks.len();

    let data = ExportData { documents, chunks };
    let json = serde_json::to_string_pretty(&data).map_err(Error::provider)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
                }
            }
            std::fs::write(path, &json).map_err(sqlx::Error::Io)?;
            eprintln!(
                "Exported {} documents, {} chunks to {}",
                doc_count,
                chunk_count,
                path.display()
            );
        }
        None => {
            println!("{}", json);
        }
    }

    pool.close().await;
    Ok(())
}

/// Republish both tables to an external HTTP store.
///
/// Rows are sent as JSON arrays to `{base_url}/{table}` in batches of
/// `export.batch_size`, retrying each batch up to `export.max_retries`
/// times with a fixed delay between attempts. Requires the
/// `EXPORT_API_KEY` environment variable.
pub async fn run_push(config: &Config, url_override: Option<&str>) -> Result<()> {
    let base_url = match url_override.or(config.export.base_url.as_deref()) {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => {
            return Err(Error::InvalidConfiguration(
                "no push destination: pass --url or set [export] base_url in config".to_string(),
            ))
        }
    };

    let api_key = std::env::var("EXPORT_API_KEY")
        .map_err(|_| Error::Provider("EXPORT_API_KEY environment variable not set".to_string()))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(Error::provider)?;

    let pool = db::connect(config).await?;

    let documents = fetch_documents(&pool).await?;
    let doc_records: Vec<serde_json::Value> = documents
        .iter()
        .map(|d| serde_json::to_value(d).map_err(Error::provider))
        .collect::<Result<_>>()?;
    push_table(config, &client, &base_url, &api_key, "documents", &doc_records).await?;

    let chunks = fetch_chunks(&pool).await?;
    let chunk_records: Vec<serde_json::Value> = chunks
        .iter()
        .map(|c| serde_json::to_value(c).map_err(Error::provider))
        .collect::<Result<_>>()?;
    push_table(config, &client, &base_url, &api_key, "chunks", &chunk_records).await?;

    pool.close().await;
    println!("ok");
    Ok(())
}

async fn push_table(
    config: &Config,
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    table: &str,
    records: &[serde_json::Value],
) -> Result<()> {
    let total = records.len();
    println!("Uploading {} rows to {}...", total, table);

    let batch_size = config.export.batch_size.max(1);
    let mut uploaded = 0usize;

    for batch in records.chunks(batch_size) {
        let mut sent = false;

        for attempt in 0..config.export.max_retries {
            let resp = client
                .post(format!("{}/{}", base_url, table))
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&batch)
                .send()
                .await;

            match resp {
                Ok(response) if response.status().is_success() => {
                    sent = true;
                    break;
                }
                Ok(response) => {
                    eprintln!(
                        "Warning: batch upload to {} failed: HTTP {}",
                        table,
                        response.status()
                    );
                }
                Err(e) => {
                    eprintln!("Warning: batch upload to {} failed: {}", table, e);
                }
            }

            if attempt + 1 < config.export.max_retries {
                tokio::time::sleep(Duration::from_secs(config.export.retry_delay_secs)).await;
            } else {
                eprintln!("Warning: max retries reached, skipping batch.");
            }
        }

        uploaded += batch.len();
        if sent {
            println!("  {} / {} rows uploaded.", uploaded.min(total), total);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::migrate;
    use tempfile::TempDir;

    async fn seeded_config() -> (TempDir, Config) {
        let tmp = TempDir::new().unwrap();
        let config = Config::minimal(tmp.path().join("rag.sqlite"));
        migrate::run_migrations(&config).await.unwrap();

        let pool = db::connect(&config).await.unwrap();
        sqlx::query("INSERT INTO documents (id, title, path, uploaded_at) VALUES (?, ?, ?, ?)")
            .bind("doc-1")
            .bind("notes")
            .bind(Option::<String>::None)
            .bind("2025-01-01 00:00:00")
            .execute(&pool)
            .await
            .unwrap();
        for idx in 0..2 {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, chunk_index, text, embedding) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(format!("chunk-{}", idx))
            .bind("doc-1")
            .bind(idx as i64)
            .bind(format!("text {}", idx))
            .bind("[1.0,2.0]")
            .execute(&pool)
            .await
            .unwrap();
        }
        pool.close().await;

        (tmp, config)
    }

    #[tokio::test]
    async fn test_export_writes_both_tables() {
        let (tmp, config) = seeded_config().await;
        let out = tmp.path().join("dump.json");

        run_export(&config, Some(&out)).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(json["documents"].as_array().unwrap().len(), 1);
        assert_eq!(json["chunks"].as_array().unwrap().len(), 2);
        assert_eq!(json["chunks"][0]["document_id"], "doc-1");
        assert_eq!(json["chunks"][0]["embedding"], "[1.0,2.0]");
    }

    #[tokio::test]
    async fn test_push_without_destination_rejected() {
        let (_tmp, config) = seeded_config().await;

        let err = run_push(&config, None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }
}
