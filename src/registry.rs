//! Per-host singleton registry.
//!
//! A `Registry<T>` maps a host to the single `T` managing it. Hosts are held
//! weakly; entries whose host has been destroyed are pruned lazily, right
//! before the next `create` or `get`.

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

use crate::error::{BrokerError, BrokerResult};
use crate::host::HostRef;

/// A type managed one-per-host by a [`Registry`].
pub trait RegistryEntry: Send + Sync + Sized + 'static {
    /// Shared state handed to the constructor.
    type Context: ?Sized;

    /// Build the manager for `host`.
    fn construct(host: HostRef, ctx: &Self::Context) -> Arc<Self>;

    /// Called once the entry has been reset out of its registry, with the
    /// registry lock released. Not called when an expired host is pruned.
    fn detach(&self) {}
}

/// Map from live hosts to their manager instance.
pub struct Registry<T: RegistryEntry> {
    entries: Mutex<HashMap<HostRef, Arc<T>>>,
}

impl<T: RegistryEntry> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: RegistryEntry> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entry", &type_name::<T>())
            .field("len", &self.len())
            .finish()
    }
}

impl<T: RegistryEntry> Registry<T> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<HostRef, Arc<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the manager for `host`, constructing it on first use.
    ///
    /// Expired entries are pruned first. Construction runs without the
    /// registry lock held; if another entry for the same host appeared in the
    /// meantime, that one wins and is returned.
    pub fn create(&self, host: &HostRef, ctx: &T::Context) -> Arc<T> {
        let expired = {
            let mut entries = self.lock();
            let expired = Self::take_expired(&mut entries);
            if let Some(entry) = entries.get(host) {
                let entry = Arc::clone(entry);
                drop(entries);
                drop(expired);
                return entry;
            }
            expired
        };
        drop(expired);

        let created = T::construct(host.clone(), ctx);

        let mut entries = self.lock();
        let entry = Arc::clone(
            entries
                .entry(host.clone())
                .or_insert_with(|| Arc::clone(&created)),
        );
        let total = entries.len();
        drop(entries);

        if Arc::ptr_eq(&entry, &created) {
            debug!(entry = type_name::<T>(), total, "registry entry created");
        }
        entry
    }

    /// Look up the manager for `host` without creating it.
    pub fn get(&self, host: &HostRef) -> Option<Arc<T>> {
        let mut entries = self.lock();
        let expired = Self::take_expired(&mut entries);
        let entry = entries.get(host).cloned();
        drop(entries);
        drop(expired);
        entry
    }

    /// Remove the entry for `host`. Absence is not an error.
    pub fn remove(&self, host: &HostRef) -> Option<Arc<T>> {
        let removed = self.lock().remove(host);
        if let Some(entry) = &removed {
            debug!(entry = type_name::<T>(), "registry entry removed");
            entry.detach();
        }
        removed
    }

    /// Remove the entry for `host` only if it is `entry`. Returns true if it
    /// was removed.
    pub fn remove_entry(&self, host: &HostRef, entry: &T) -> bool {
        let removed = {
            let mut entries = self.lock();
            match entries.get(host) {
                Some(stored) if std::ptr::eq(Arc::as_ptr(stored), entry) => entries.remove(host),
                _ => None,
            }
        };
        match removed {
            Some(stored) => {
                debug!(entry = type_name::<T>(), "registry entry removed");
                stored.detach();
                true
            }
            None => false,
        }
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.lock());
        if !drained.is_empty() {
            debug!(entry = type_name::<T>(), count = drained.len(), "registry cleared");
        }
        for entry in drained.values() {
            entry.detach();
        }
    }

    /// Remove entries whose host has been destroyed. Returns how many.
    pub fn prune_expired(&self) -> usize {
        let expired = Self::take_expired(&mut self.lock());
        expired.len()
    }

    /// Number of entries, expired ones included until the next prune.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if the registry holds no entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Expired values are returned so they are dropped after the lock is released.
    fn take_expired(entries: &mut HashMap<HostRef, Arc<T>>) -> Vec<Arc<T>> {
        let keys: Vec<HostRef> = entries.keys().filter(|k| k.is_expired()).cloned().collect();
        if !keys.is_empty() {
            debug!(entry = type_name::<T>(), count = keys.len(), "pruning expired registry entries");
        }
        keys.iter().filter_map(|k| entries.remove(k)).collect()
    }
}

/// Weak handle to a registry-owned manager.
///
/// The registry holds the only long-lived strong reference. Once the entry is
/// removed (explicit reset, reset-all or host expiry), [`Handle::get`] fails
/// with [`BrokerError::ExpiredHandle`].
pub struct Handle<T> {
    inner: Weak<T>,
}

impl<T> Handle<T> {
    /// Create a handle to `entry`.
    #[must_use]
    pub fn new(entry: &Arc<T>) -> Self {
        Self {
            inner: Arc::downgrade(entry),
        }
    }

    /// Dereference the handle.
    ///
    /// # Errors
    /// `BrokerError::ExpiredHandle` if the manager no longer exists.
    pub fn get(&self) -> BrokerResult<Arc<T>> {
        self.inner.upgrade().ok_or(BrokerError::ExpiredHandle {
            type_name: type_name::<T>(),
        })
    }

    /// Returns true once the manager has been dropped.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.inner.strong_count() == 0
    }

    /// Returns true if both handles point to the same manager.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("type", &type_name::<T>())
            .field("expired", &self.is_expired())
            .finish()
    }
}
