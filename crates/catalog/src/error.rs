//! Catalog error types.

use thiserror::Error;

/// Catalog operation errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A faulty named query reached the result generator.
    #[error("faulty named query: {0}")]
    FaultyQuery(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid catalog document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for catalog operations.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
