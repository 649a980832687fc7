//! Reentrant document lock.

use crate::config::LockConfig;
use crate::error::{LockError, LockResult};
use crate::poll;
use crate::{COUNT_FIELD, OWNER_FIELD};
use std::sync::Arc;
use std::time::Duration;
use syncdoc_store::{DocumentId, DocumentStore, FieldExpect, FieldOp, FieldValue};
use uuid::Uuid;

/// A reentrant distributed lock on a single document.
///
/// Like [`DocumentLock`](crate::DocumentLock), but the same owner token may
/// re-acquire while held: each acquire increments a counter sentinel, each
/// release decrements it, and the document is unlocked only when the
/// counter returns to zero. Distinct tokens still exclude each other.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use syncdoc_lock::{DocumentRLock, LockConfig};
/// use syncdoc_store::{DocumentId, MemoryStore};
///
/// let store = Arc::new(MemoryStore::new());
/// let lock = DocumentRLock::new(store, DocumentId::new("job-1"), LockConfig::default());
///
/// assert!(lock.acquire(false, None).unwrap());
/// assert!(lock.acquire(false, None).unwrap()); // reentrant
/// lock.release().unwrap();
/// lock.release().unwrap(); // now fully unlocked
/// ```
pub struct DocumentRLock {
    store: Arc<dyn DocumentStore>,
    document: DocumentId,
    lock_id: String,
    config: LockConfig,
}

/// One conditional claim: succeed if nobody holds the document, or this
/// token already does; either way bump the reentrancy counter.
fn try_claim(store: &dyn DocumentStore, document: &DocumentId, lock_id: &str) -> LockResult<bool> {
    Ok(store.update_if(
        document,
        &[(OWNER_FIELD, FieldExpect::AbsentOrEquals(FieldValue::text(lock_id)))],
        &[
            (OWNER_FIELD, FieldOp::Set(FieldValue::text(lock_id))),
            (COUNT_FIELD, FieldOp::Increment(1)),
        ],
    )?)
}

impl DocumentRLock {
    /// Creates a reentrant lock for the given document with a fresh owner
    /// token.
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

    /// Attempts to acquire the lock, re-entering if this token already
    /// holds it.
    ///
    /// Same blocking/timeout contract as
    /// [`DocumentLock::acquire`](crate::DocumentLock::acquire).
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
            tracing::trace!(document = %self.document, "reentrant lock acquired");
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

        if !acquired {
            tracing::debug!(document = %self.document, ?timeout, "reentrant acquisition timed out");
        }
        Ok(acquired)
    }

    /// Releases one level of the lock.
    ///
    /// If the counter is at one and this token owns the document, both
    /// sentinels are cleared atomically; otherwise the counter is
    /// decremented under the same ownership precondition.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Corrupted`] if neither conditional update
    /// matches - the token no longer owns the document, whether because
    /// the sentinels were tampered with or the lock was already fully
    /// released.
    pub fn release(&self) -> LockResult<()> {
        let owner = FieldValue::text(&self.lock_id);

        let fully_released = self.store.update_if(
            &self.document,
            &[
                (OWNER_FIELD, FieldExpect::Equals(owner.clone())),
                (COUNT_FIELD, FieldExpect::Equals(FieldValue::Integer(1))),
            ],
            &[(OWNER_FIELD, FieldOp::Clear), (COUNT_FIELD, FieldOp::Clear)],
        )?;
        if fully_released {
            tracing::trace!(document = %self.document, "reentrant lock fully released");
            return Ok(());
        }

        let decremented = self.store.update_if(
            &self.document,
            &[(OWNER_FIELD, FieldExpect::Equals(owner))],
            &[(COUNT_FIELD, FieldOp::Increment(-1))],
        )?;
        if decremented {
            tracing::trace!(document = %self.document, "reentrant lock count decremented");
            Ok(())
        } else {
            Err(LockError::Corrupted {
                document: self.document.clone(),
            })
        }
    }

    /// Unconditionally clears both sentinel fields, regardless of owner.
    ///
    /// Administrative recovery only.
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
        tracing::warn!(document = %self.document, "reentrant lock force-released");
        Ok(())
    }

    /// Acquires one level with the configured parameters and returns a
    /// guard that releases that level on drop.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] if the lock could not be acquired
    /// within the configured bounds.
    pub fn guard(&self) -> LockResult<RLockGuard<'_>> {
        if self.acquire(self.config.blocking, self.config.timeout)? {
            Ok(RLockGuard {
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

/// Scoped holder of one acquisition level of a [`DocumentRLock`].
#[must_use = "dropping the guard releases the lock immediately"]
pub struct RLockGuard<'a> {
    lock: &'a DocumentRLock,
    armed: bool,
}

impl RLockGuard<'_> {
    /// Releases this level, surfacing the release outcome.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Corrupted`] if the sentinels were externally
    /// modified while held.
    pub fn unlock(mut self) -> LockResult<()> {
        self.armed = false;
        self.lock.release()
    }
}

impl Drop for RLockGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = self.lock.release() {
                tracing::error!(
                    document = %self.lock.document,
                    error = %err,
                    "reentrant release failed during guard drop"
                );
            }
        }
    }
}
