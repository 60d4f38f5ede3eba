//! Host-side notice center.
//!
//! Every host exposes one `NoticeCenter`. It is the delivery target for both
//! the host's own native notices and the consolidated notices re-emitted by a
//! broker. Listeners are keyed by the concrete notice type they accept.
//!
//! Callbacks always run without the center lock held, so a listener may send
//! further notices, register new listeners or revoke itself while being called.

/// Channel-backed subscriber stream.
pub mod stream;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crossbeam_channel::bounded;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicU64;
use uuid::Uuid;

pub use stream::NoticeStream;

/// Unique identifier for one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerKey(Uuid);

impl ListenerKey {
    /// Create a new random listener key.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ListenerKey {
    fn default() -> Self {
        Self::new()
    }
}

type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;

struct Listener {
    key: ListenerKey,
    callback: Callback,
}

#[derive(Default)]
struct CenterState {
    by_type: HashMap<TypeId, Vec<Listener>>,
}

impl CenterState {
    fn revoke(&mut self, key: ListenerKey) -> bool {
        let mut found = false;
        self.by_type.retain(|_, listeners| {
            let before = listeners.len();
            listeners.retain(|l| l.key != key);
            found |= listeners.len() != before;
            !listeners.is_empty()
        });
        found
    }

    fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }
}

fn read_state(state: &RwLock<CenterState>) -> RwLockReadGuard<'_, CenterState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_state(state: &RwLock<CenterState>) -> RwLockWriteGuard<'_, CenterState> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

/// Typed listener table owned by a host.
#[derive(Default)]
pub struct NoticeCenter {
    state: Arc<RwLock<CenterState>>,
}

impl fmt::Debug for NoticeCenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoticeCenter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl NoticeCenter {
    /// Create an empty center.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for notices of concrete type `N`.
    pub fn register<N, F>(&self, listener: F) -> ListenerKey
    where
        N: Any,
        F: Fn(&N) + Send + Sync + 'static,
    {
        let key = ListenerKey::new();
        let callback: Callback = Arc::new(move |notice: &dyn Any| {
            if let Some(notice) = notice.downcast_ref::<N>() {
                listener(notice);
            }
        });

        write_state(&self.state)
            .by_type
            .entry(TypeId::of::<N>())
            .or_default()
            .push(Listener { key, callback });
        key
    }

    /// Revoke a listener. Returns false if the key was unknown.
    pub fn revoke(&self, key: ListenerKey) -> bool {
        write_state(&self.state).revoke(key)
    }

    /// Deliver a typed notice to every listener registered for `N`.
    pub fn send<N: Any>(&self, notice: &N) -> usize {
        self.send_dyn(notice)
    }

    /// Deliver a type-erased notice, routed by its concrete type.
    ///
    /// Returns the number of listeners invoked.
    pub fn send_dyn(&self, notice: &dyn Any) -> usize {
        let type_id = Any::type_id(notice);
        let callbacks: Vec<Callback> = read_state(&self.state)
            .by_type
            .get(&type_id)
            .map(|listeners| listeners.iter().map(|l| Arc::clone(&l.callback)).collect())
            .unwrap_or_default();

        for callback in &callbacks {
            callback(notice);
        }
        callbacks.len()
    }

    /// Total number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        read_state(&self.state).len()
    }

    /// Number of listeners registered for notices of type `N`.
    #[must_use]
    pub fn listener_count_for<N: Any>(&self) -> usize {
        read_state(&self.state)
            .by_type
            .get(&TypeId::of::<N>())
            .map_or(0, Vec::len)
    }

    /// Subscribe a bounded stream to notices of type `N`.
    ///
    /// Delivery never blocks the sender: when the stream is full the notice is
    /// dropped and counted. A zero `capacity` is raised to one.
    pub fn stream<N>(&self, capacity: usize) -> NoticeStream<N>
    where
        N: Any + Clone + Send,
    {
        let (tx, rx) = bounded::<N>(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&dropped);

        let key = self.register::<N, _>(move |notice| {
            if tx.try_send(notice.clone()).is_err() {
                counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        });

        NoticeStream::new(key, rx, self.downgrade(), dropped)
    }

    /// Weak reference used to revoke listeners after the owner is gone.
    #[must_use]
    pub fn downgrade(&self) -> CenterRef {
        CenterRef(Arc::downgrade(&self.state))
    }
}

/// Weak reference to a `NoticeCenter`.
#[derive(Clone)]
pub struct CenterRef(Weak<RwLock<CenterState>>);

impl fmt::Debug for CenterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CenterRef")
            .field("expired", &self.is_expired())
            .finish()
    }
}

impl CenterRef {
    /// Revoke a listener if the center is still alive.
    pub fn revoke(&self, key: ListenerKey) -> bool {
        self.0
            .upgrade()
            .is_some_and(|state| write_state(&state).revoke(key))
    }

    /// Returns true once the center has been dropped.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.0.strong_count() == 0
    }
}

/// Set of listener registrations revoked together.
///
/// Dispatchers and reporters keep their registrations here; dropping the set
/// revokes everything it holds.
#[derive(Debug, Default)]
pub struct ListenerKeys {
    keys: Mutex<Vec<(CenterRef, ListenerKey)>>,
}

impl ListenerKeys {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener on `center` and remember its key.
    pub fn register<N, F>(&self, center: &NoticeCenter, listener: F) -> ListenerKey
    where
        N: Any,
        F: Fn(&N) + Send + Sync + 'static,
    {
        let key = center.register::<N, F>(listener);
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((center.downgrade(), key));
        key
    }

    /// Revoke every remembered listener.
    pub fn revoke_all(&self) {
        let keys = std::mem::take(&mut *self.keys.lock().unwrap_or_else(PoisonError::into_inner));
        for (center, key) in keys {
            center.revoke(key);
        }
    }

    /// Number of live registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ListenerKeys {
    fn drop(&mut self) {
        self.revoke_all();
    }
}
