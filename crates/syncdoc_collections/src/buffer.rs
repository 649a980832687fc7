//! Deferred synchronization through a shared buffer.
//!
//! A [`BufferManager`] is the explicit, shared-ownership replacement for
//! class-wide buffer state: one manager per backend configuration, handed
//! to each collection by `Arc`. While a buffering scope is open, collection
//! loads and saves go through the manager's table instead of the resource;
//! the table is written back when the outermost scope closes, or early when
//! the capacity budget overflows.
//!
//! Every flush re-checks the resource's metadata fingerprint captured when
//! its entry was created. A mismatch means the resource was modified
//! externally during the buffered window: that entry's flush is aborted and
//! the external value left intact, but the rest of the batch is still
//! attempted, and all failures are raised together naming every affected
//! resource.

use crate::backend::{CollectionBackend, ResourceId};
use crate::error::{CollectionError, CollectionResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use syncdoc_store::Fingerprint;

/// How buffered contents are held in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferStrategy {
    /// Entries hold encoded bytes. Every entry counts against the capacity
    /// budget, and each buffered read pays a decode.
    Serialized,

    /// Entries hold the live value, shared by every collection addressing
    /// that resource while buffered. Reads are cheap, but only *modified*
    /// entries count against capacity, so read-heavy access can grow the
    /// buffer until the scope exits.
    Shared,
}

/// Snapshot of buffer activity.
#[derive(Debug, Clone, Default)]
pub struct BufferStats {
    /// Entries currently in the table.
    pub entries: usize,
    /// Bytes currently counted against the capacity budget.
    pub buffered_bytes: usize,
    /// Natural flushes (scope exits and explicit flushes).
    pub flushes: u64,
    /// Forced flushes triggered by capacity overflow.
    pub forced_flushes: u64,
    /// Entries whose flush was aborted by an external modification.
    pub conflicts: u64,
    /// Buffered loads served from the table.
    pub hits: u64,
    /// Buffered loads that had to read the resource.
    pub misses: u64,
}

enum EntryContents {
    Serialized(Vec<u8>),
    Shared(Value),
}

struct BufferEntry {
    backend: Arc<dyn CollectionBackend>,
    contents: EntryContents,
    /// Resource metadata at the time the entry was created.
    fingerprint: Fingerprint,
    modified: bool,
    /// Encoded byte size of the contents.
    size: usize,
}

impl BufferEntry {
    fn decode(&self) -> CollectionResult<Value> {
        match &self.contents {
            EntryContents::Serialized(bytes) => Ok(serde_json::from_slice(bytes)?),
            EntryContents::Shared(value) => Ok(value.clone()),
        }
    }
}

#[derive(Default)]
struct Counters {
    flushes: u64,
    forced_flushes: u64,
    conflicts: u64,
    hits: u64,
    misses: u64,
}

#[derive(Default)]
struct BufferTable {
    entries: HashMap<ResourceId, BufferEntry>,
    /// Insertion order, oldest first; drives forced-flush eligibility.
    order: VecDeque<ResourceId>,
    counters: Counters,
}

impl BufferTable {
    fn counted_bytes(&self, strategy: BufferStrategy) -> usize {
        self.entries
            .values()
            .filter(|entry| match strategy {
                BufferStrategy::Serialized => true,
                BufferStrategy::Shared => entry.modified,
            })
            .map(|entry| entry.size)
            .sum()
    }

    fn insert(&mut self, resource: ResourceId, entry: BufferEntry) {
        if self.entries.insert(resource.clone(), entry).is_none() {
            self.order.push_back(resource);
        }
    }

    fn remove(&mut self, resource: &ResourceId) -> Option<BufferEntry> {
        let entry = self.entries.remove(resource);
        if entry.is_some() {
            self.order.retain(|r| r != resource);
        }
        entry
    }
}

/// Shared buffer for a family of collections.
///
/// All collections handed the same manager flush together when the
/// outermost [`BufferScope`] closes. Table mutation and flushing are
/// serialized by one manager-wide lock; the lock is coarse by design,
/// because releasing one collection from the buffer can affect others
/// sharing the same resource.
pub struct BufferManager {
    strategy: BufferStrategy,
    /// Capacity budget in bytes of encoded contents.
    capacity: usize,
    /// Nesting depth of open buffering scopes.
    depth: AtomicUsize,
    table: Mutex<BufferTable>,
}

impl BufferManager {
    /// Creates a manager with the given strategy and capacity budget in
    /// bytes.
    #[must_use]
    pub fn new(strategy: BufferStrategy, capacity: usize) -> Self {
        Self {
            strategy,
            capacity,
            depth: AtomicUsize::new(0),
            table: Mutex::new(BufferTable::default()),
        }
    }

    /// Returns the buffering strategy.
    #[must_use]
    pub fn strategy(&self) -> BufferStrategy {
        self.strategy
    }

    /// Returns the capacity budget in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns whether any buffering scope is currently open.
    #[must_use]
    pub fn is_buffered(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }

    /// Opens a buffering scope.
    ///
    /// Scopes nest: collections stay buffered until the outermost scope
    /// closes, at which point the whole table is flushed.
    #[must_use]
    pub fn scope(&self) -> BufferScope<'_> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        BufferScope {
            manager: self,
            closed: false,
        }
    }

    /// Returns a snapshot of buffer activity.
    #[must_use]
    pub fn stats(&self) -> BufferStats {
        let table = self.table.lock();
        BufferStats {
            entries: table.entries.len(),
            buffered_bytes: table.counted_bytes(self.strategy),
            flushes: table.counters.flushes,
            forced_flushes: table.counters.forced_flushes,
            conflicts: table.counters.conflicts,
            hits: table.counters.hits,
            misses: table.counters.misses,
        }
    }

    /// Loads a resource through the buffer, caching the result.
    pub(crate) fn load(
        &self,
        backend: &Arc<dyn CollectionBackend>,
    ) -> CollectionResult<Option<Value>> {
        let mut table = self.table.lock();
        let resource = backend.resource_id().clone();

        if let Some(entry) = table.entries.get(&resource) {
            let decoded = entry.decode();
            table.counters.hits += 1;
            return decoded.map(Some);
        }

        table.counters.misses += 1;
        let Some(data) = backend.load_resource()? else {
            return Ok(None);
        };
        let fingerprint = backend.fingerprint()?;
        let encoded = serde_json::to_vec(&data)?;
        let size = encoded.len();
        let contents = match self.strategy {
            BufferStrategy::Serialized => EntryContents::Serialized(encoded),
            BufferStrategy::Shared => EntryContents::Shared(data.clone()),
        };

        table.insert(
            resource,
            BufferEntry {
                backend: Arc::clone(backend),
                contents,
                fingerprint,
                modified: false,
                size,
            },
        );
        self.enforce_capacity(&mut table)?;
        Ok(Some(data))
    }

    /// Writes a resource's contents into the buffer.
    ///
    /// May trigger a forced flush if the write pushes the counted size
    /// over the capacity budget; the buffering scope stays open.
    pub(crate) fn save(
        &self,
        backend: &Arc<dyn CollectionBackend>,
        data: &Value,
    ) -> CollectionResult<()> {
        let mut table = self.table.lock();
        let resource = backend.resource_id().clone();

        let encoded = serde_json::to_vec(data)?;
        let size = encoded.len();
        let contents = match self.strategy {
            BufferStrategy::Serialized => EntryContents::Serialized(encoded),
            BufferStrategy::Shared => EntryContents::Shared(data.clone()),
        };

        match table.entries.get_mut(&resource) {
            Some(entry) => {
                entry.contents = contents;
                entry.size = size;
                entry.modified = true;
            }
            None => {
                // First buffered touch is a write: the fingerprint still
                // describes the resource's pre-write state.
                let fingerprint = backend.fingerprint()?;
                table.insert(
                    resource,
                    BufferEntry {
                        backend: Arc::clone(backend),
                        contents,
                        fingerprint,
                        modified: true,
                        size,
                    },
                );
            }
        }

        self.enforce_capacity(&mut table)
    }

    /// Flushes and evicts oldest eligible entries until the counted size
    /// is back under the capacity budget.
    fn enforce_capacity(&self, table: &mut BufferTable) -> CollectionResult<()> {
        let mut failed = Vec::new();

        while table.counted_bytes(self.strategy) > self.capacity {
            let next = table.order.iter().find(|resource| {
                let entry = &table.entries[*resource];
                match self.strategy {
                    BufferStrategy::Serialized => true,
                    BufferStrategy::Shared => entry.modified,
                }
            });
            let Some(resource) = next.cloned() else {
                break;
            };

            let entry = match table.remove(&resource) {
                Some(entry) => entry,
                None => break,
            };

            if entry.modified {
                table.counters.forced_flushes += 1;
                tracing::debug!(resource = %resource, "forced flush on capacity overflow");
                if !Self::commit_entry(&resource, &entry, &mut table.counters, &mut failed) {
                    continue;
                }
            }
            // Unmodified entries are plain evictions.
        }

        Self::conclude(failed)
    }

    /// Flushes the whole table and empties it.
    ///
    /// Performed when the outermost buffering scope closes; also available
    /// for an explicit mid-scope write-back.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::BufferConflicts`] naming every resource
    /// whose flush failed. All entries are attempted regardless.
    pub fn flush_all(&self) -> CollectionResult<()> {
        let mut table = self.table.lock();
        table.counters.flushes += 1;

        let mut failed = Vec::new();
        while let Some(resource) = table.order.pop_front() {
            let Some(entry) = table.entries.remove(&resource) else {
                continue;
            };
            if entry.modified {
                Self::commit_entry(&resource, &entry, &mut table.counters, &mut failed);
            }
        }

        debug_assert!(table.entries.is_empty());
        tracing::debug!(failed = failed.len(), "buffer flushed");

        Self::conclude(failed)
    }

    /// Flushes and evicts a single resource's entry, if present.
    pub(crate) fn flush_resource(&self, resource: &ResourceId) -> CollectionResult<()> {
        let mut table = self.table.lock();
        let Some(entry) = table.remove(resource) else {
            return Ok(());
        };

        let mut failed = Vec::new();
        if entry.modified {
            table.counters.flushes += 1;
            Self::commit_entry(resource, &entry, &mut table.counters, &mut failed);
        }
        Self::conclude(failed)
    }

    /// Writes one modified entry back to its resource.
    ///
    /// Returns whether the entry committed; a fingerprint mismatch or I/O
    /// failure records the resource in `failed` and leaves the external
    /// resource intact.
    fn commit_entry(
        resource: &ResourceId,
        entry: &BufferEntry,
        counters: &mut Counters,
        failed: &mut Vec<String>,
    ) -> bool {
        let current = match entry.backend.fingerprint() {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                tracing::error!(resource = %resource, error = %err, "fingerprint probe failed during flush");
                failed.push(resource.to_string());
                return false;
            }
        };

        if current != entry.fingerprint {
            counters.conflicts += 1;
            tracing::warn!(
                resource = %resource,
                "resource modified externally during buffered window, flush aborted"
            );
            failed.push(resource.to_string());
            return false;
        }

        let outcome = entry
            .decode()
            .and_then(|value| entry.backend.save_resource(&value));
        if let Err(err) = outcome {
            tracing::error!(resource = %resource, error = %err, "flush write failed");
            failed.push(resource.to_string());
            return false;
        }
        true
    }

    fn conclude(failed: Vec<String>) -> CollectionResult<()> {
        if failed.is_empty() {
            Ok(())
        } else {
            Err(CollectionError::BufferConflicts { resources: failed })
        }
    }

    fn exit_scope(&self) -> CollectionResult<()> {
        if self.depth.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.flush_all()
        } else {
            Ok(())
        }
    }
}

/// An open buffering scope.
///
/// Dropping the scope closes it; closing the outermost scope flushes the
/// manager's whole table. Flush failures cannot propagate from `Drop`, so
/// they are logged and swallowed there; callers that need the flush
/// outcome use [`BufferScope::close`].
#[must_use = "dropping the scope immediately ends buffering"]
pub struct BufferScope<'a> {
    manager: &'a BufferManager,
    closed: bool,
}

impl BufferScope<'_> {
    /// Closes the scope, surfacing the flush outcome if this was the
    /// outermost one.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::BufferConflicts`] naming every resource
    /// whose flush failed.
    pub fn close(mut self) -> CollectionResult<()> {
        self.closed = true;
        self.manager.exit_scope()
    }

    /// Returns the manager this scope belongs to.
    #[must_use]
    pub fn manager(&self) -> &BufferManager {
        self.manager
    }
}

impl Drop for BufferScope<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.manager.exit_scope() {
                tracing::error!(error = %err, "buffer flush failed during scope drop");
            }
        }
    }
}
