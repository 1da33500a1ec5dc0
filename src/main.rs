//! # ragstore CLI (`rag`)
//!
//! The `rag` binary is the interface to a local RAG store. It provides
//! commands for database initialization, document ingestion and re-indexing,
//! metadata updates, retrieval, answer generation, and bulk export.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the SQLite database and run schema migrations |
//! | `rag add <file>` | Ingest a text file (or `--text` for pasted text) |
//! | `rag reindex <id>` | Rebuild a document's chunks from a new or stored source |
//! | `rag update <id>` | Update a document's title and/or source path |
//! | `rag list` | List stored documents |
//! | `rag delete <id>` | Delete a document and its chunks |
//! | `rag query "<q>"` | Print the retrieval context for a query |
//! | `rag ask "<q>"` | Retrieve context and generate an answer |
//! | `rag export` | Dump both tables as JSON |
//! | `rag push` | Republish both tables to an external HTTP store |

mod answer;
mod chunk;
mod config;
mod db;
mod embedding;
mod error;
mod export;
mod migrate;
mod models;
mod retrieve;
mod store;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::store::{DocumentStore, ReindexSource};

/// ragstore CLI — chunk, embed, and retrieve text documents from SQLite.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "ragstore — a minimal local RAG store",
    version,
    long_about = "ragstore ingests text documents, splits them into overlapping word-windows, \
    embeds each window through a configurable provider, and persists everything in SQLite. \
    Queries rank all stored embeddings by cosine similarity and expand each hit with its \
    neighboring chunks."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Ingest a document.
    ///
    /// Reads a text file (positional argument) or takes pasted text via
    /// `--text`, chunks it, embeds every chunk, and stores the result.
    /// Requires an embedding provider to be configured.
    Add {
        /// Path to a text file to ingest.
        file: Option<PathBuf>,

        /// Pasted text to ingest instead of a file.
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,

        /// Display title. Defaults to the file name, or "pasted_text".
        #[arg(long)]
        title: Option<String>,

        /// Words per chunk (overrides config).
        #[arg(long)]
        window_size: Option<usize>,

        /// Words shared between consecutive chunks (overrides config).
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Rebuild a document's chunks from a new text snapshot.
    ///
    /// Takes fresh text (`--text`), a fresh file (positional), or falls
    /// back to re-reading the document's stored source path. The old chunk
    /// set is replaced whole; there is no partial update.
    Reindex {
        /// Document id.
        id: String,

        /// Path to a new text file to re-index from.
        file: Option<PathBuf>,

        /// New pasted text to re-index from.
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,

        /// Words per chunk (overrides config).
        #[arg(long)]
        window_size: Option<usize>,

        /// Words shared between consecutive chunks (overrides config).
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Update a document's title and/or source path.
    ///
    /// Only the supplied fields change; chunks are never touched.
    Update {
        /// Document id.
        id: String,

        /// New display title.
        #[arg(long)]
        title: Option<String>,

        /// New source path.
        #[arg(long)]
        path: Option<String>,
    },

    /// List stored documents as "title (id)" labels.
    List,

    /// Delete a document and all of its chunks.
    Delete {
        /// Document id.
        id: String,
    },

    /// Print the retrieval context for a query.
    ///
    /// Ranks every stored chunk by cosine similarity against the query
    /// embedding, expands the top hits with their neighboring chunks, and
    /// prints the deduplicated context.
    Query {
        /// The query string.
        query: String,

        /// Number of top-ranked chunks to expand (overrides config).
        #[arg(long)]
        top_k: Option<usize>,

        /// Neighboring chunks per side of each hit (overrides config).
        #[arg(long)]
        radius: Option<i64>,
    },

    /// Retrieve context and generate an answer.
    ///
    /// Runs the same retrieval as `query`, assembles a grounded prompt,
    /// and sends it to the configured chat-completions endpoint.
    Ask {
        /// The question.
        question: String,

        /// Number of top-ranked chunks to expand (overrides config).
        #[arg(long)]
        top_k: Option<usize>,

        /// Neighboring chunks per side of each hit (overrides config).
        #[arg(long)]
        radius: Option<i64>,
    },

    /// Dump documents and chunks as JSON.
    Export {
        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Republish documents and chunks to an external HTTP store.
    ///
    /// Sends rows in fixed-size batches with bounded retry. Requires the
    /// `EXPORT_API_KEY` environment variable.
    Push {
        /// Destination base URL (overrides `[export] base_url` in config).
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Add {
            file,
            text,
            title,
            window_size,
            overlap,
        } => {
            let provider = embedding::create_provider(&cfg.embedding)?;
            let pool = db::connect(&cfg).await?;
            let store = DocumentStore::new(pool);

            let window_size = window_size.unwrap_or(cfg.chunking.window_size);
            let overlap = overlap.unwrap_or(cfg.chunking.overlap);

            let (doc_id, chunk_count) = match (file, text) {
                (Some(path), None) => {
                    store
                        .ingest_file(&path, title.as_deref(), window_size, overlap, provider.as_ref())
                        .await?
                }
                (None, Some(text)) => {
                    store
                        .ingest(&text, title.as_deref(), None, window_size, overlap, provider.as_ref())
                        .await?
                }
                _ => anyhow::bail!("Provide a file path or --text"),
            };

            println!("Added document {} with {} chunks.", doc_id, chunk_count);
        }
        Commands::Reindex {
            id,
            file,
            text,
            window_size,
            overlap,
        } => {
            let provider = embedding::create_provider(&cfg.embedding)?;
            let pool = db::connect(&cfg).await?;
            let store = DocumentStore::new(pool);

            let window_size = window_size.unwrap_or(cfg.chunking.window_size);
            let overlap = overlap.unwrap_or(cfg.chunking.overlap);

            let source = match (file, text) {
                (Some(path), None) => Some(ReindexSource::File(path)),
                (None, Some(text)) => Some(ReindexSource::Text(text)),
                _ => None,
            };

            let chunk_count = store
                .reindex(&id, source, window_size, overlap, provider.as_ref())
                .await?;
            println!("Re-indexed document {} with {} chunks.", id, chunk_count);
        }
        Commands::Update { id, title, path } => {
            let pool = db::connect(&cfg).await?;
            let store = DocumentStore::new(pool);

            let applied = store
                .update_metadata(&id, title.as_deref(), path.as_deref())
                .await?;
            if applied {
                println!("Updated document {}.", id);
            } else {
                println!("No changes applied.");
            }
        }
        Commands::List => {
            let pool = db::connect(&cfg).await?;
            let store = DocumentStore::new(pool);

            let docs = store.list_documents().await?;
            if docs.is_empty() {
                println!("No documents.");
            } else {
                let mut labels: Vec<&String> = docs.keys().collect();
                labels.sort();
                for label in labels {
                    println!("{}", label);
                }
            }
        }
        Commands::Delete { id } => {
            let pool = db::connect(&cfg).await?;
            let store = DocumentStore::new(pool);

            store.delete_document(&id).await?;
            println!("Deleted document {}.", id);
        }
        Commands::Query {
            query,
            top_k,
            radius,
        } => {
            let provider = embedding::create_provider(&cfg.embedding)?;
            let pool = db::connect(&cfg).await?;

            let k = top_k.unwrap_or(cfg.retrieval.top_k);
            let radius = radius.unwrap_or(cfg.retrieval.context_radius);

            let context =
                retrieve::retrieve_context(&pool, provider.as_ref(), &query, k, radius).await?;
            if context.is_empty() {
                println!("No results.");
            } else {
                for (i, text) in context.iter().enumerate() {
                    println!("[{}]", i + 1);
                    println!("{}", text);
                    println!();
                }
            }
        }
        Commands::Ask {
            question,
            top_k,
            radius,
        } => {
            let provider = embedding::create_provider(&cfg.embedding)?;
            let pool = db::connect(&cfg).await?;

            let k = top_k.unwrap_or(cfg.retrieval.top_k);
            let radius = radius.unwrap_or(cfg.retrieval.context_radius);

            let context =
                retrieve::retrieve_context(&pool, provider.as_ref(), &question, k, radius).await?;
            let prompt = answer::build_prompt(&context, &question);
            let reply = answer::generate_answer(&cfg.llm, &prompt).await?;

            println!("--- Answer ---");
            println!("{}", reply);
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref()).await?;
        }
        Commands::Push { url } => {
            export::run_push(&cfg, url.as_deref()).await?;
        }
    }

    Ok(())
}
