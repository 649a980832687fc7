//! # syncdoc Lock
//!
//! Distributed document locks for syncdoc.
//!
//! This crate implements mutual exclusion on top of a
//! [`DocumentStore`](syncdoc_store::DocumentStore): a lock is held by
//! writing an owner sentinel field onto the document through the store's
//! atomic conditional update, and released by conditionally clearing it.
//! No in-process shared memory is involved in cross-process coordination;
//! all coordination state lives in the store.
//!
//! ## Lock variants
//!
//! - [`DocumentLock`] - plain mutual exclusion; at most one owner token may
//!   hold the sentinel at any time
//! - [`DocumentRLock`] - reentrant variant; the same owner token may
//!   re-acquire, tracked by a counter sentinel
//!
//! ## Failure semantics
//!
//! Acquisition never fails with an error on timeout - it returns `false`.
//! Release failures are always errors: a conditional release that does not
//! observe its own token means the document's coordination state can no
//! longer be trusted ([`LockError::Corrupted`]).
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use syncdoc_lock::{DocumentLock, LockConfig};
//! use syncdoc_store::{DocumentId, MemoryStore};
//!
//! let store = Arc::new(MemoryStore::new());
//! let lock = DocumentLock::new(store, DocumentId::new("job-1"), LockConfig::default());
//!
//! let guard = lock.guard().unwrap();
//! // ... multi-step operation on the document ...
//! guard.unlock().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod lock;
mod poll;
mod rlock;

pub use config::LockConfig;
pub use error::{LockError, LockResult};
pub use lock::{DocumentLock, LockGuard};
pub use rlock::{DocumentRLock, RLockGuard};

/// Sentinel field holding the current owner token.
pub(crate) const OWNER_FIELD: &str = "_lock_owner";
/// Sentinel field holding the reentrancy counter.
pub(crate) const COUNT_FIELD: &str = "_lock_count";
