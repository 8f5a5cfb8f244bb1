//! # Support RAG
//!
//! Answers customer-support questions from a knowledge base of resolved
//! tickets using retrieval-augmented generation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ tickets.json │──▶│ Embed+Index │──▶│   SQLite     │
//! │   (loader)   │   │  (lazy)     │   │ vector index │
//! └──────────────┘   └─────────────┘   └──────┬───────┘
//!                                             │ k-NN
//!                                             ▼
//!                   ┌──────────┐        ┌────────────┐
//!                   │  Gemini  │◀───────│   Query    │
//!                   │ generate │ prompt │   Engine   │
//!                   └──────────┘        └─────┬──────┘
//!                                   ┌─────────┴────────┐
//!                                   ▼                  ▼
//!                              ┌─────────┐       ┌──────────┐
//!                              │   CLI   │       │   HTTP   │
//!                              │  (tix)  │       │  (axum)  │
//!                              └─────────┘       └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`loader`] | Ticket file loading, sampling, statistics |
//! | [`embedding`] | Embedding providers and the memoized generator |
//! | [`sqlite_index`] | Persistent vector index |
//! | [`index`] | Collection setup and lazy population |
//! | [`llm`] | Gemini client |
//! | [`engine`] | Retrieval, prompting, and answer fallbacks |
//! | [`server`] | HTTP API |
//! | [`commands`] | `tix` subcommands |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`logging`] | `tracing` subscriber setup |
//!
//! Runtime-agnostic types (tickets, validation, the index trait, prompt
//! assembly) live in the `support-rag-core` crate.

pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod index;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod migrate;
pub mod server;
pub mod sqlite_index;
