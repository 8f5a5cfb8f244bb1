//! Error taxonomy shared by the loader, embedding, and index layers.
//!
//! The query engine sits above all of these and never lets one escape:
//! every variant is eventually turned into a user-readable string there.

use thiserror::Error;

/// Result alias used across the pipeline.
pub type Result<T> = std::result::Result<T, RagError>;

/// Top-level error for pipeline operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// The ticket source does not exist.
    #[error("tickets file not found: {0}")]
    NotFound(String),

    /// The ticket source is empty, malformed, or has no usable tickets.
    #[error("invalid ticket data: {0}")]
    Invalid(String),

    /// The embedding model failed to load or to encode.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The index client or collection could not be set up.
    #[error("failed to initialize index: {0}")]
    Init(String),

    /// The batch write into the index failed.
    #[error("failed to index tickets: {0}")]
    Index(String),

    /// A nearest-neighbour query against the index failed.
    #[error("index search failed: {0}")]
    Search(String),

    /// Caller supplied unusable input (e.g. an empty query).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl RagError {
    /// Short machine-readable code, used in diagnostics and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::NotFound(_) => "not_found",
            RagError::Invalid(_) => "invalid",
            RagError::Embedding(_) => "embedding_error",
            RagError::Init(_) => "init_error",
            RagError::Index(_) => "index_error",
            RagError::Search(_) => "search_error",
            RagError::InvalidInput(_) => "invalid_input",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_detail() {
        let err = RagError::NotFound("data/tickets.json".into());
        assert_eq!(err.to_string(), "tickets file not found: data/tickets.json");
        assert_eq!(err.code(), "not_found");

        let err = RagError::Init("disk full".into());
        assert!(err.to_string().contains("disk full"));
        assert_eq!(err.code(), "init_error");
    }
}
