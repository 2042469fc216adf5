//! Error types for the document search core.
//!
//! Every fallible operation in the store, index and service returns
//! [`SearchError`]. Callers that need to map errors onto a transport (HTTP
//! status codes, process exit codes) should branch on
//! [`SearchError::category`] rather than on the message text.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::embeddings::ModelError;

/// Result type alias for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors surfaced by ingestion, querying and persistence.
#[derive(Debug, Error)]
pub enum SearchError {
    /// An ingestion batch (or an index build) had no entries.
    #[error("document list is empty")]
    EmptyInput,

    /// The query text was blank after trimming.
    #[error("query is empty")]
    EmptyQuery,

    /// A document source file could not be opened.
    #[error("document source {} could not be opened: {source}", path.display())]
    SourceNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A document source was opened but its contents could not be read as text.
    #[error("document source {} is not readable text: {source}", path.display())]
    InvalidSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The store file could not be written.
    #[error("failed to save embeddings to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No collection has ever been saved at this location.
    #[error("embeddings file {} not found", path.display())]
    NotFound { path: PathBuf },

    /// The store file exists but could not be read.
    #[error("failed to read embeddings from {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The persisted bytes are not a well-formed record collection.
    #[error("embeddings file {} is corrupt: {reason}", path.display())]
    CorruptData { path: PathBuf, reason: String },

    /// Two vectors that must agree in length do not.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A vector component is NaN or infinite; JSON cannot carry it.
    #[error("vector {position} has a non-finite component")]
    NonFiniteVector { position: usize },

    /// Search was attempted on an index holding zero vectors.
    #[error("similarity index holds no vectors")]
    UninitializedIndex,

    /// No index is loaded; nothing has been ingested yet or startup recovery failed.
    #[error("similarity index is not initialized or empty")]
    IndexUnavailable,

    /// The embedding model failed.
    #[error("embedding failed: {0}")]
    Embedding(#[from] ModelError),
}

/// Coarse classification of a [`SearchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller supplied bad input.
    InvalidInput,
    /// The system has no data to answer with yet.
    NotReady,
    /// Durable storage is missing, unwritable or corrupted.
    Storage,
    /// The embedding capability failed.
    Embedding,
}

impl SearchError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SearchError::EmptyInput
            | SearchError::EmptyQuery
            | SearchError::SourceNotFound { .. }
            | SearchError::InvalidSource { .. }
            | SearchError::DimensionMismatch { .. }
            | SearchError::NonFiniteVector { .. } => ErrorCategory::InvalidInput,
            SearchError::UninitializedIndex | SearchError::IndexUnavailable => {
                ErrorCategory::NotReady
            }
            SearchError::Persistence { .. }
            | SearchError::NotFound { .. }
            | SearchError::Unreadable { .. }
            | SearchError::CorruptData { .. } => ErrorCategory::Storage,
            SearchError::Embedding(_) => ErrorCategory::Embedding,
        }
    }
}
