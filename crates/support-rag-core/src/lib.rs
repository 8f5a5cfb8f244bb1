//! # Support RAG Core
//!
//! Shared, runtime-agnostic logic for support-rag: ticket models and
//! validation, the error taxonomy, the vector index abstraction, retrieval
//! scoring, and RAG prompt assembly.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network clients.
//! Concrete embedding providers, the SQLite index, and the generative model
//! client live in the `support-rag` app crate.

pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod prompt;
pub mod retrieval;
pub mod store;
pub mod tickets;

pub use error::{RagError, Result};
