//! Error types for collection operations.

use std::io;
use thiserror::Error;

/// Result type for collection operations.
pub type CollectionResult<T> = Result<T, CollectionError>;

/// Errors that can occur in synchronized-collection operations.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// Document store error.
    #[error("store error: {0}")]
    Store(#[from] syncdoc_store::StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding or decoding resource contents failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The resource or initial data does not have the collection's base
    /// container shape.
    #[error("invalid collection type: expected {expected}, got {actual}")]
    InvalidType {
        /// The container shape the collection requires.
        expected: &'static str,
        /// The shape actually found.
        actual: &'static str,
    },

    /// A validator rejected incoming data.
    #[error("invalid data: {message}")]
    InvalidData {
        /// Description of the rejection.
        message: String,
    },

    /// A mapping key was not found.
    #[error("key not found: {key}")]
    KeyError {
        /// The missing key.
        key: String,
    },

    /// A sequence index was out of bounds.
    #[error("index {index} out of bounds for sequence of length {len}")]
    IndexError {
        /// The requested index.
        index: usize,
        /// The sequence length at the time of access.
        len: usize,
    },

    /// A child handle addresses a node that no longer exists in the tree.
    #[error("collection path no longer exists: {path}")]
    StalePath {
        /// Dotted rendering of the stale path.
        path: String,
    },

    /// One or more buffered resources were modified externally during the
    /// buffered window; their flushes were aborted.
    ///
    /// Every resource in the batch is attempted before this is raised, so
    /// the list names all conflicting resources, not just the first.
    #[error("buffered flush aborted, externally modified resources: {}", resources.join(", "))]
    BufferConflicts {
        /// All resources whose flush was aborted.
        resources: Vec<String>,
    },
}

impl CollectionError {
    /// Creates a validation rejection.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Creates a missing-key error.
    pub fn key_error(key: impl Into<String>) -> Self {
        Self::KeyError { key: key.into() }
    }
}
