//! # ragstore
//!
//! A minimal local RAG store.
//!
//! Documents are split into overlapping word-windows, each window is embedded
//! through a pluggable provider, and everything lands in a single SQLite file.
//! Queries rank every stored embedding by cosine similarity, pull in each
//! hit's neighboring chunks for context, and deduplicate the result.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────┐
//! │ file / text  │──▶│ chunk + embed │──▶│  SQLite   │
//! └──────────────┘   └───────────────┘   └────┬─────┘
//!                                             │
//!                          ┌──────────────────┤
//!                          ▼                  ▼
//!                    ┌──────────┐       ┌──────────┐
//!                    │ retrieve │       │  export   │
//!                    │  + ask   │       │  / push   │
//!                    └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag init                          # create database
//! rag add notes.txt                 # ingest a text file
//! rag add --text "..." --title t   # ingest pasted text
//! rag query "deployment steps"      # print retrieval context
//! rag ask "how do we deploy?"       # retrieval + LLM answer
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Overlapping word-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Document/chunk persistence and re-indexing |
//! | [`retrieve`] | Similarity ranking and context expansion |
//! | [`answer`] | Answer generation over retrieved context |
//! | [`export`] | JSON dump and batched remote push |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`error`] | Typed error kinds |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod export;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod store;
