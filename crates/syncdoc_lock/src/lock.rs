//! Plain (non-reentrant) document lock.

use crate::config::LockConfig;
use crate::error::{LockError, LockResult};
use crate::poll;
use crate::{COUNT_FIELD, OWNER_FIELD};
use std::sync::Arc;
use std::time::Duration;
use syncdoc_store::{DocumentId, DocumentStore, FieldExpect, FieldOp, FieldValue};
use uuid::Uuid;

/// A distributed mutual-exclusion lock on a single document.
///
/// The lock is held by writing this instance's owner token into the
/// document's owner sentinel field through the store's atomic conditional
/// update, so at most one distinct token can hold a given document at any
/// time - across threads, processes, and hosts sharing the store.
///
/// Constructing a lock has no side effect on the store; the sentinel is
/// written on acquire and cleared on release.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use syncdoc_lock::{DocumentLock, LockConfig};
/// use syncdoc_store::{DocumentId, MemoryStore};
///
/// let store = Arc::new(MemoryStore::new());
/// let lock = DocumentLock::new(store, DocumentId::new("job-1"), LockConfig::default());
///
/// assert!(lock.acquire(false, None).unwrap());
/// lock.release().unwrap();
/// ```
pub struct DocumentLock {
    store: Arc<dyn DocumentStore>,
    document: DocumentId,
    lock_id: String,
    config: LockConfig,
}

/// A single conditional claim of the owner sentinel.
fn try_claim(store: &dyn DocumentStore, document: &DocumentId, lock_id: &str) -> LockResult<bool> {
    Ok(store.update_if(
        document,
        &[(OWNER_FIELD, FieldExpect::Absent)],
        &[(OWNER_FIELD, FieldOp::Set(FieldValue::text(lock_id)))],
    )?)
}

impl DocumentLock {
    /// Creates a lock for the given document with a fresh owner token.
    pub fn new(store: Arc<dyn DocumentStore>, document: DocumentId, config: LockConfig) -> Self {
        Self {
            store,
            document,
            lock_id: Uuid::new_v4().to_string(),
            config,
        }
    }

    /// Returns the document this lock coordinates.
    #[must_use]
    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    /// Returns this instance's owner token.
    #[must_use]
    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    /// Attempts to acquire the lock.
    ///
    /// Non-blocking: a single conditional claim; returns whether it
    /// matched. Blocking: retries the claim on a background poller with
    /// damped backoff until success or `timeout` elapses; timeout is
    /// reported as `Ok(false)`, never an error. The poller never outlives
    /// the call.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::InvalidTimeout`] if `timeout` is set while
    /// `blocking` is false, or a store error if the claim itself fails.
    pub fn acquire(&self, blocking: bool, timeout: Option<Duration>) -> LockResult<bool> {
        if !blocking && timeout.is_some() {
            return Err(LockError::InvalidTimeout);
        }

        if try_claim(self.store.as_ref(), &self.document, &self.lock_id)? {
            tracing::trace!(document = %self.document, "lock acquired");
            return Ok(true);
        }
        if !blocking {
            return Ok(false);
        }

        let store = Arc::clone(&self.store);
        let document = self.document.clone();
        let lock_id = self.lock_id.clone();
        let acquired = poll::poll_until(
            move || try_claim(store.as_ref(), &document, &lock_id),
            timeout,
        )?;

        if acquired {
            tracing::trace!(document = %self.document, "lock acquired after polling");
        } else {
            tracing::debug!(document = %self.document, ?timeout, "lock acquisition timed out");
        }
        Ok(acquired)
    }

    /// Releases the lock.
    ///
    /// The owner sentinel is cleared only if it still equals this
    /// instance's token.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Corrupted`] if the sentinel no longer holds
    /// this token - the release never silently succeeds on a document
    /// whose coordination state was tampered with.
    pub fn release(&self) -> LockResult<()> {
        let matched = self.store.update_if(
            &self.document,
            &[(OWNER_FIELD, FieldExpect::Equals(FieldValue::text(&self.lock_id)))],
            &[(OWNER_FIELD, FieldOp::Clear)],
        )?;

        if matched {
            tracing::trace!(document = %self.document, "lock released");
            Ok(())
        } else {
            Err(LockError::Corrupted {
                document: self.document.clone(),
            })
        }
    }

    /// Unconditionally clears the sentinel fields, regardless of owner.
    ///
    /// Administrative recovery only: this bypasses the ownership invariant
    /// and must not be used while cooperating processes are live.
    ///
    /// # Errors
    ///
    /// Returns a store error if the update fails.
    pub fn force_release(&self) -> LockResult<()> {
        self.store.update_if(
            &self.document,
            &[],
            &[(OWNER_FIELD, FieldOp::Clear), (COUNT_FIELD, FieldOp::Clear)],
        )?;
        tracing::warn!(document = %self.document, "lock force-released");
        Ok(())
    }

    /// Acquires the lock with this instance's configured parameters and
    /// returns a guard that releases on drop.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] if the lock could not be acquired
    /// within the configured bounds.
    pub fn guard(&self) -> LockResult<LockGuard<'_>> {
        if self.acquire(self.config.blocking, self.config.timeout)? {
            Ok(LockGuard {
                lock: self,
                armed: true,
            })
        } else {
            Err(LockError::Timeout {
                document: self.document.clone(),
            })
        }
    }
}

/// Scoped holder of a [`DocumentLock`].
///
/// Dropping the guard releases the lock. A release failure during drop
/// cannot propagate, so it is logged at error level and swallowed; callers
/// that need the release outcome use [`LockGuard::unlock`].
#[must_use = "dropping the guard releases the lock immediately"]
pub struct LockGuard<'a> {
    lock: &'a DocumentLock,
    armed: bool,
}

impl LockGuard<'_> {
    /// Releases the lock, surfacing the release outcome.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Corrupted`] if the owner sentinel was
    /// externally modified while held.
    pub fn unlock(mut self) -> LockResult<()> {
        self.armed = false;
        self.lock.release()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = self.lock.release() {
                tracing::error!(
                    document = %self.lock.document,
                    error = %err,
                    "lock release failed during guard drop"
                );
            }
        }
    }
}
