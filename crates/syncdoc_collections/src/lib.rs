//! # syncdoc Collections
//!
//! Synchronized collections with pluggable buffering for syncdoc.
//!
//! A synchronized collection is a mapping ([`SyncedDict`]) or sequence
//! ([`SyncedList`]) whose authoritative state lives in a backend resource.
//! Every mutating operation runs as a scoped load-mutate-save: fresh
//! backend data is reconciled into the in-memory tree, the mutation is
//! validated and applied, and the result is written back - either straight
//! through to the resource, or into a [`BufferManager`] that defers the
//! write until a buffering scope closes or its capacity budget overflows.
//!
//! ## Composition
//!
//! Collections are assembled from three independent parts rather than an
//! inheritance tower:
//!
//! - a [`CollectionBackend`] strategy (file, memory slot, or store document)
//! - an optional shared [`BufferManager`] with a [`BufferStrategy`]
//! - the generic container type with its validators
//!
//! ## Nested handles
//!
//! Child collections are cursor handles addressing a node inside the root
//! tree, so a handle obtained earlier observes writes made through any
//! other handle on the same tree:
//!
//! ```rust
//! use serde_json::json;
//! use syncdoc_collections::{CollectionBuilder, MemoryBackend};
//! use std::sync::Arc;
//!
//! let doc = CollectionBuilder::new(Arc::new(MemoryBackend::new()))
//!     .build_dict()
//!     .unwrap();
//! doc.reset(json!({"a": 1, "b": {"c": 2}})).unwrap();
//!
//! let b = doc.dict("b").unwrap();
//! doc.dict("b").unwrap().insert("c", 3).unwrap();
//! assert_eq!(b.get("c").unwrap(), json!(3));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod buffer;
mod convert;
mod dict;
mod error;
mod list;
mod reconcile;
mod synced;
mod validate;

pub use backend::{
    CollectionBackend, DocumentBackend, JsonFileBackend, MemoryBackend, ResourceId,
};
pub use buffer::{BufferManager, BufferScope, BufferStats, BufferStrategy};
pub use convert::{numeric_list, numeric_matrix, IntoPlainValue};
pub use dict::SyncedDict;
pub use error::{CollectionError, CollectionResult};
pub use list::SyncedList;
pub use synced::{CollectionBufferScope, CollectionBuilder};
pub use validate::{json_format_validator, reserved_key_validator, Validator};

/// The plain-data interchange type for collection contents.
pub use serde_json::Value;
