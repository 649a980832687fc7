//! # syncdoc Store
//!
//! Document store trait and implementations for syncdoc.
//!
//! This crate provides the lowest-level storage abstraction for syncdoc:
//! a keyed document store that supports **atomic conditional field updates**.
//! Everything the locking layer needs from a backend is expressed as a
//! single operation: "apply these field updates iff these preconditions
//! hold", evaluated atomically with respect to every other writer.
//!
//! ## Design Principles
//!
//! - Stores hold opaque JSON documents keyed by [`DocumentId`]
//! - The conditional update ([`DocumentStore::update_if`]) is the one hard
//!   atomicity requirement placed on a backend
//! - Absent documents are valid targets; `None` from load means "does not
//!   exist yet" and is never an error
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For testing and ephemeral coordination
//! - [`JsonFileStore`] - One JSON file per document, advisory-locked for
//!   cross-process safety
//!
//! ## Example
//!
//! ```rust
//! use syncdoc_store::{DocumentId, DocumentStore, FieldExpect, FieldOp, FieldValue, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let doc = DocumentId::new("job-42");
//!
//! // Claim an owner field iff nobody holds it.
//! let claimed = store
//!     .update_if(
//!         &doc,
//!         &[("owner", FieldExpect::Absent)],
//!         &[("owner", FieldOp::Set(FieldValue::text("holder-1")))],
//!     )
//!     .unwrap();
//! assert!(claimed);
//!
//! // A second claim with the same precondition fails to match.
//! let claimed = store
//!     .update_if(
//!         &doc,
//!         &[("owner", FieldExpect::Absent)],
//!         &[("owner", FieldOp::Set(FieldValue::text("holder-2")))],
//!     )
//!     .unwrap();
//! assert!(!claimed);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;
mod types;

pub use error::{StoreError, StoreResult};
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use store::DocumentStore;
pub use types::{DocumentId, FieldExpect, FieldOp, FieldValue, Fingerprint, Payload};
