//! Root state and generic machinery shared by all synchronized collections.
//!
//! Every collection tree has one `Root` holding the backend strategy, the
//! optional buffer manager, the validator list, and the in-memory data.
//! [`SyncedDict`] and [`SyncedList`] handles are cursors into that tree: a
//! root handle has an empty path, a child handle addresses a nested node
//! positionally. All handles on one tree share the root, so synchronization
//! responsibility is delegated upward and a held child handle observes
//! writes made through any other handle.

use crate::backend::{type_name, CollectionBackend};
use crate::buffer::BufferManager;
use crate::convert::IntoPlainValue;
use crate::dict::SyncedDict;
use crate::error::{CollectionError, CollectionResult};
use crate::list::SyncedList;
use crate::reconcile;
use crate::validate::{json_format_validator, Validator};
use parking_lot::{ReentrantMutex, RwLock};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One step of a cursor path into the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PathSegment {
    /// A mapping key.
    Key(String),
    /// A sequence index.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, ".{key}"),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

pub(crate) fn path_string(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "<root>".to_string();
    }
    path.iter().map(ToString::to_string).collect()
}

pub(crate) fn stale_path(path: &[PathSegment]) -> CollectionError {
    CollectionError::StalePath {
        path: path_string(path),
    }
}

/// The container shape a root collection requires of its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RootKind {
    Mapping,
    Sequence,
}

impl RootKind {
    fn empty(self) -> Value {
        match self {
            Self::Mapping => Value::Object(serde_json::Map::new()),
            Self::Sequence => Value::Array(Vec::new()),
        }
    }

    fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Mapping, Value::Object(_)) | (Self::Sequence, Value::Array(_))
        )
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Mapping => "mapping",
            Self::Sequence => "sequence",
        }
    }
}

/// Shared state of one collection tree.
pub(crate) struct Root {
    backend: Arc<dyn CollectionBackend>,
    buffer: Option<Arc<BufferManager>>,
    validators: Vec<Validator>,
    kind: RootKind,
    /// Serializes every load-mutate-save window within the process.
    op_lock: ReentrantMutex<()>,
    data: RwLock<Value>,
    /// Open per-instance buffering scopes on this tree.
    instance_buffer_depth: AtomicUsize,
}

impl Root {
    /// Returns the buffer manager if a buffering scope (manager-wide or
    /// per-instance) is currently open.
    fn active_buffer(&self) -> Option<&Arc<BufferManager>> {
        let manager = self.buffer.as_ref()?;
        if manager.is_buffered() || self.instance_buffer_depth.load(Ordering::SeqCst) > 0 {
            Some(manager)
        } else {
            None
        }
    }

    /// Reconciles fresh backend (or buffer) data into the in-memory tree.
    fn refresh(&self) -> CollectionResult<()> {
        let fresh = match self.active_buffer() {
            Some(manager) => manager.load(&self.backend)?,
            None => self.backend.load_resource()?,
        };

        let fresh = match fresh {
            Some(value) => {
                if !self.kind.matches(&value) {
                    return Err(CollectionError::InvalidType {
                        expected: self.kind.name(),
                        actual: type_name(&value),
                    });
                }
                value
            }
            // A missing resource is treated as empty, not an error.
            None => self.kind.empty(),
        };

        reconcile::update_in_place(&mut self.data.write(), fresh);
        Ok(())
    }

    /// Writes the in-memory tree to the backend or buffer.
    fn persist(&self) -> CollectionResult<()> {
        let data = self.data.read();
        match self.active_buffer() {
            Some(manager) => manager.save(&self.backend, &data),
            None => self.backend.save_resource(&data),
        }
    }

    /// Runs `f` against the node at `path` after refreshing from the
    /// resource.
    pub(crate) fn read_at<T>(
        &self,
        path: &[PathSegment],
        f: impl FnOnce(&Value) -> CollectionResult<T>,
    ) -> CollectionResult<T> {
        let _op = self.op_lock.lock();
        self.refresh()?;
        let data = self.data.read();
        let node = resolve(&data, path).ok_or_else(|| stale_path(path))?;
        f(node)
    }

    /// Runs `f` against the mutable node at `path` inside a full
    /// load-mutate-save window.
    ///
    /// If `f` fails the save is skipped; ground truth is re-established
    /// from the resource on the next access.
    pub(crate) fn mutate_at<T>(
        &self,
        path: &[PathSegment],
        f: impl FnOnce(&mut Value) -> CollectionResult<T>,
    ) -> CollectionResult<T> {
        let _op = self.op_lock.lock();
        self.refresh()?;
        let result = {
            let mut data = self.data.write();
            let node = resolve_mut(&mut data, path).ok_or_else(|| stale_path(path))?;
            f(node)?
        };
        self.persist()?;
        Ok(result)
    }

    /// Applies every registered validator to an incoming datum.
    pub(crate) fn validate(&self, value: &Value) -> CollectionResult<()> {
        for validator in &self.validators {
            validator(value)?;
        }
        Ok(())
    }

    /// Opens a per-instance buffering scope on this tree.
    pub(crate) fn begin_instance_scope(root: Arc<Self>) -> CollectionBufferScope {
        root.instance_buffer_depth.fetch_add(1, Ordering::SeqCst);
        CollectionBufferScope {
            root,
            closed: false,
        }
    }

    fn exit_instance_scope(&self) -> CollectionResult<()> {
        if self.instance_buffer_depth.fetch_sub(1, Ordering::SeqCst) == 1 {
            if let Some(manager) = &self.buffer {
                // If a manager-wide scope is still open the entry stays
                // buffered; its flush happens at that scope's exit.
                if !manager.is_buffered() {
                    return manager.flush_resource(self.backend.resource_id());
                }
            }
        }
        Ok(())
    }
}

fn resolve<'v>(root: &'v Value, path: &[PathSegment]) -> Option<&'v Value> {
    let mut node = root;
    for segment in path {
        node = match (segment, node) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key)?,
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(node)
}

fn resolve_mut<'v>(root: &'v mut Value, path: &[PathSegment]) -> Option<&'v mut Value> {
    let mut node = root;
    for segment in path {
        node = match (segment, node) {
            (PathSegment::Key(key), Value::Object(map)) => map.get_mut(key)?,
            (PathSegment::Index(index), Value::Array(items)) => items.get_mut(*index)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Assembles a synchronized collection from its parts.
///
/// The builder composes a backend strategy, an optional shared buffer
/// manager, validators, and optional initial data into a root
/// [`SyncedDict`] or [`SyncedList`]. The JSON-format validator is always
/// installed first.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use std::sync::Arc;
/// use syncdoc_collections::{BufferManager, BufferStrategy, CollectionBuilder, MemoryBackend};
///
/// let buffer = Arc::new(BufferManager::new(BufferStrategy::Serialized, 1 << 20));
/// let doc = CollectionBuilder::new(Arc::new(MemoryBackend::new()))
///     .buffer(&buffer)
///     .initial(json!({"a": 1}))
///     .build_dict()
///     .unwrap();
/// assert_eq!(doc.get("a").unwrap(), json!(1));
/// ```
pub struct CollectionBuilder {
    backend: Arc<dyn CollectionBackend>,
    buffer: Option<Arc<BufferManager>>,
    validators: Vec<Validator>,
    initial: Option<Value>,
}

impl CollectionBuilder {
    /// Starts a builder for the given backend.
    pub fn new<B: CollectionBackend + 'static>(backend: Arc<B>) -> Self {
        let backend: Arc<dyn CollectionBackend> = backend;
        Self {
            backend,
            buffer: None,
            validators: vec![json_format_validator()],
            initial: None,
        }
    }

    /// Attaches a shared buffer manager.
    #[must_use]
    pub fn buffer(mut self, manager: &Arc<BufferManager>) -> Self {
        self.buffer = Some(Arc::clone(manager));
        self
    }

    /// Registers an additional validator.
    #[must_use]
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Supplies initial data, validated and written through on build.
    #[must_use]
    pub fn initial(mut self, value: impl IntoPlainValue) -> Self {
        self.initial = Some(value.into_plain_value());
        self
    }

    /// Builds a root mapping collection.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidType`] if the initial data or the
    /// existing resource is not a mapping, or a validation error if the
    /// initial data is rejected.
    pub fn build_dict(self) -> CollectionResult<SyncedDict> {
        let root = self.build_root(RootKind::Mapping)?;
        Ok(SyncedDict::from_root(root, Vec::new()))
    }

    /// Builds a root sequence collection.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidType`] if the initial data or the
    /// existing resource is not a sequence, or a validation error if the
    /// initial data is rejected.
    pub fn build_list(self) -> CollectionResult<SyncedList> {
        let root = self.build_root(RootKind::Sequence)?;
        Ok(SyncedList::from_root(root, Vec::new()))
    }

    fn build_root(self, kind: RootKind) -> CollectionResult<Arc<Root>> {
        let root = Arc::new(Root {
            backend: self.backend,
            buffer: self.buffer,
            validators: self.validators,
            kind,
            op_lock: ReentrantMutex::new(()),
            data: RwLock::new(kind.empty()),
            instance_buffer_depth: AtomicUsize::new(0),
        });

        match self.initial {
            Some(initial) => {
                if !kind.matches(&initial) {
                    return Err(CollectionError::InvalidType {
                        expected: kind.name(),
                        actual: type_name(&initial),
                    });
                }
                root.validate(&initial)?;

                let _op = root.op_lock.lock();
                *root.data.write() = initial;
                root.persist()?;
            }
            None => root.refresh()?,
        }

        Ok(root)
    }
}

/// An open per-collection buffering scope.
///
/// While open, loads and saves of this collection's resource go through
/// the attached buffer manager even if no manager-wide scope is open. When
/// the last scope on the tree closes, the resource's buffer entry is
/// flushed (unless a manager-wide scope is still buffering it).
///
/// On a collection with no buffer manager attached the scope has no
/// effect: every save keeps writing straight through.
#[must_use = "dropping the scope immediately ends buffering for this collection"]
pub struct CollectionBufferScope {
    root: Arc<Root>,
    closed: bool,
}

impl CollectionBufferScope {
    /// Closes the scope, surfacing the flush outcome.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::BufferConflicts`] if the resource was
    /// modified externally during the buffered window.
    pub fn close(mut self) -> CollectionResult<()> {
        self.closed = true;
        self.root.exit_instance_scope()
    }
}

impl Drop for CollectionBufferScope {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.root.exit_instance_scope() {
                tracing::error!(error = %err, "collection buffer flush failed during scope drop");
            }
        }
    }
}
