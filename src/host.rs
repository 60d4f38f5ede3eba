//! Host objects observed by the broker.
//!
//! A host is the mutable shared resource whose changes are observed. The
//! broker never owns a host: it keeps a [`HostRef`], a weak handle compared by
//! identity, and checks liveness before use.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use crate::center::NoticeCenter;

/// A mutable resource emitting native notices.
pub trait Host: Send + Sync + 'static {
    /// Listener table receiving the host's native notices and the broker's
    /// consolidated notices.
    fn notices(&self) -> &NoticeCenter;
}

/// Weak, identity-compared reference to a host.
///
/// Two references are equal when they point to the same host allocation. An
/// expired reference stays comparable, so registries can still find and
/// remove entries keyed by it.
#[derive(Clone)]
pub struct HostRef(Weak<dyn Host>);

impl HostRef {
    /// Reference a host.
    #[must_use]
    pub fn new<H: Host>(host: &Arc<H>) -> Self {
        let weak: Weak<H> = Arc::downgrade(host);
        Self(weak)
    }

    /// Reference a type-erased host.
    #[must_use]
    pub fn from_dyn(host: &Arc<dyn Host>) -> Self {
        Self(Arc::downgrade(host))
    }

    /// Upgrade to a strong reference if the host is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Arc<dyn Host>> {
        self.0.upgrade()
    }

    /// Returns true once the host has been destroyed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.0.strong_count() == 0
    }

    fn addr(&self) -> *const () {
        self.0.as_ptr().cast::<()>()
    }
}

impl<H: Host> From<&Arc<H>> for HostRef {
    fn from(host: &Arc<H>) -> Self {
        Self::new(host)
    }
}

impl From<&HostRef> for HostRef {
    fn from(host: &HostRef) -> Self {
        host.clone()
    }
}

impl PartialEq for HostRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.addr(), other.addr())
    }
}

impl Eq for HostRef {}

impl Hash for HostRef {
    fn hash<S: Hasher>(&self, state: &mut S) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostRef")
            .field("addr", &self.addr())
            .field("expired", &self.is_expired())
            .finish()
    }
}

/// Native notice: the content of the host changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentsEdited;

/// Native notice: objects of the host were edited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectsEdited {
    /// Paths whose subtree was created, removed or rebuilt.
    pub resynced: Vec<String>,
    /// Paths where only fields changed.
    pub changed_info: Vec<String>,
    /// `(path, field)` pairs naming the changed fields.
    pub changed_fields: Vec<(String, String)>,
}

type FieldMap = BTreeMap<String, String>;

/// In-memory reference host.
///
/// Objects are addressed by `/`-separated paths and carry string fields.
/// Every mutation emits [`ObjectsEdited`] followed by [`ContentsEdited`]
/// on the host's notice center, after the internal lock is released.
#[derive(Debug, Default)]
pub struct InMemoryHost {
    center: NoticeCenter,
    objects: RwLock<BTreeMap<String, FieldMap>>,
}

impl InMemoryHost {
    /// Create an empty host.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Define an object at `path`. Returns false if it already exists.
    pub fn define(&self, path: &str) -> bool {
        let inserted = {
            let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
            if objects.contains_key(path) {
                false
            } else {
                objects.insert(path.to_string(), FieldMap::new());
                true
            }
        };
        if inserted {
            self.emit(ObjectsEdited {
                resynced: vec![path.to_string()],
                ..ObjectsEdited::default()
            });
        }
        inserted
    }

    /// Set a field on an existing object. Returns false if the object is
    /// missing.
    pub fn set_field(&self, path: &str, key: &str, value: impl Into<String>) -> bool {
        let updated = {
            let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
            match objects.get_mut(path) {
                Some(fields) => {
                    fields.insert(key.to_string(), value.into());
                    true
                }
                None => false,
            }
        };
        if updated {
            self.emit(ObjectsEdited {
                changed_info: vec![path.to_string()],
                changed_fields: vec![(path.to_string(), key.to_string())],
                ..ObjectsEdited::default()
            });
        }
        updated
    }

    /// Remove the object at `path` and everything below it.
    pub fn remove(&self, path: &str) -> bool {
        let removed = {
            let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
            let before = objects.len();
            let prefix = format!("{}/", path.trim_end_matches('/'));
            objects.retain(|p, _| p != path && !p.starts_with(&prefix));
            objects.len() != before
        };
        if removed {
            self.emit(ObjectsEdited {
                resynced: vec![path.to_string()],
                ..ObjectsEdited::default()
            });
        }
        removed
    }

    /// Read a field.
    #[must_use]
    pub fn field(&self, path: &str, key: &str) -> Option<String> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .and_then(|fields| fields.get(key).cloned())
    }

    /// Returns true if an object exists at `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    /// All object paths in sorted order.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn emit(&self, edit: ObjectsEdited) {
        self.center.send(&edit);
        self.center.send(&ContentsEdited);
    }
}

impl Host for InMemoryHost {
    fn notices(&self) -> &NoticeCenter {
        &self.center
    }
}
