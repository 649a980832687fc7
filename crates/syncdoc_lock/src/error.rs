//! Error types for lock operations.

use syncdoc_store::DocumentId;
use thiserror::Error;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors that can occur during lock operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// A timeout was supplied for a non-blocking acquire.
    #[error("cannot set a timeout for non-blocking acquire")]
    InvalidTimeout,

    /// A scoped acquisition gave up before the lock became available.
    ///
    /// Only raised by [`guard`](crate::DocumentLock::guard)-style scoped
    /// acquisition; a plain `acquire` reports timeout as `Ok(false)`.
    #[error("timed out acquiring lock on document {document}")]
    Timeout {
        /// The document that could not be locked.
        document: DocumentId,
    },

    /// A conditional release did not observe its own owner token.
    ///
    /// The sentinel fields were modified externally while the lock was
    /// held; the document's coordination state can no longer be trusted.
    #[error("lock corrupted on document {document}: owner sentinel externally modified")]
    Corrupted {
        /// The document whose sentinel state is corrupted.
        document: DocumentId,
    },

    /// The underlying store failed.
    #[error("store error: {0}")]
    Store(#[from] syncdoc_store::StoreError),
}
