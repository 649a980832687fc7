//! Document store trait definition.

use crate::error::StoreResult;
use crate::types::{DocumentId, FieldExpect, FieldOp, Fingerprint, Payload};

/// A keyed document store for syncdoc.
///
/// Stores hold **opaque JSON documents**. They provide whole-document load
/// and save, plus one conditional operation on top-level sentinel fields.
/// syncdoc owns all interpretation of document contents - stores do not
/// understand lock sentinels, collections, or buffering.
///
/// # Invariants
///
/// - `update_if` is atomic with respect to every other `update_if` on the
///   same store: no interleaving observes a partially applied update, and
///   two concurrent calls whose guards exclude each other cannot both match
/// - An absent document is a valid `update_if` target (all fields read as
///   absent); a matching update that sets or increments a field materializes
///   the document
/// - `load` returns `None` for a document that does not exist; this is not
///   an error
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::MemoryStore`] - For testing and in-process coordination
/// - [`super::JsonFileStore`] - For cross-process coordination through the
///   file system
pub trait DocumentStore: Send + Sync {
    /// Atomically applies `ops` to the document iff every guard in `guards`
    /// holds against its current state.
    ///
    /// Returns whether the update matched (all guards held and the ops were
    /// applied).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - An `Increment` targets a field holding a non-integer value
    /// - The underlying storage fails
    fn update_if(
        &self,
        doc: &DocumentId,
        guards: &[(&str, FieldExpect)],
        ops: &[(&str, FieldOp)],
    ) -> StoreResult<bool>;

    /// Loads the full payload of a document.
    ///
    /// Returns `None` if the document does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored content cannot be read or decoded.
    fn load(&self, doc: &DocumentId) -> StoreResult<Option<Payload>>;

    /// Replaces the full payload of a document, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be encoded or written.
    fn save(&self, doc: &DocumentId, payload: &Payload) -> StoreResult<()>;

    /// Removes a document, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn remove(&self, doc: &DocumentId) -> StoreResult<bool>;

    /// Probes the document's current metadata fingerprint.
    ///
    /// Two equal fingerprints mean the document has not observably changed
    /// between the probes. A missing document yields
    /// [`Fingerprint::Absent`], which compares like any other value.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be read.
    fn fingerprint(&self, doc: &DocumentId) -> StoreResult<Fingerprint>;
}
