//! Named extension store.
//!
//! A `Collector<T>` holds at most one extension per identifier, where `T` is
//! the extension base (`dyn Dispatcher`, `dyn Reporter`). Items arrive either
//! explicitly through [`Collector::add`] or through plugin discovery.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::error::PluginError;
use crate::plugin::PluginRegistry;

/// Conversion of a shared extension into a shared `Any`, used for typed lookup.
pub trait AsAnyArc: Any + Send + Sync {
    /// Convert into `Arc<dyn Any>` preserving the concrete type.
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<X: Any + Send + Sync> AsAnyArc for X {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// An item storable in a [`Collector`].
pub trait Extension: AsAnyArc {
    /// Stable key of the extension. Defaults to the concrete type name, so
    /// two instances of one type share a slot.
    fn identifier(&self) -> &'static str {
        type_name::<Self>()
    }
}

/// Compile-time proof that `Self` can be stored as a `T`.
pub trait Upcast<T: ?Sized> {
    /// Convert a shared `Self` into a shared `T`.
    fn upcast(self: Arc<Self>) -> Arc<T>;
}

/// Extension store keyed by identifier.
pub struct Collector<T: ?Sized + Extension> {
    items: HashMap<&'static str, Arc<T>>,
}

impl<T: ?Sized + Extension> Default for Collector<T> {
    fn default() -> Self {
        Self {
            items: HashMap::new(),
        }
    }
}

impl<T: ?Sized + Extension> fmt::Debug for Collector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.items.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("Collector").field("items", &ids).finish()
    }
}

impl<T: ?Sized + Extension> Collector<T> {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `item`, replacing any extension with the same identifier.
    pub fn add<C: Upcast<T>>(&mut self, item: C) -> Arc<T> {
        let item = Arc::new(item).upcast();
        self.insert(Arc::clone(&item));
        item
    }

    /// Store an already shared item. Returns the item it replaced.
    pub fn insert(&mut self, item: Arc<T>) -> Option<Arc<T>> {
        let id = item.identifier();
        trace!(extension = id, "extension collected");
        self.items.insert(id, item)
    }

    /// Item of concrete type `C`, if collected.
    #[must_use]
    pub fn get<C: Any + Send + Sync>(&self) -> Option<Arc<C>> {
        if let Some(item) = self.items.get(type_name::<C>()) {
            if let Ok(found) = Arc::clone(item).as_any_arc().downcast::<C>() {
                return Some(found);
            }
        }
        // Types overriding their identifier are found by scanning.
        self.items
            .values()
            .find_map(|item| Arc::clone(item).as_any_arc().downcast::<C>().ok())
    }

    /// Item stored under `identifier`.
    #[must_use]
    pub fn get_by_id(&self, identifier: &str) -> Option<Arc<T>> {
        self.items.get(identifier).cloned()
    }

    /// Every collected item, in unspecified order.
    #[must_use]
    pub fn items(&self) -> Vec<Arc<T>> {
        self.items.values().cloned().collect()
    }

    /// Number of collected items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remove every item.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Collect every extension of `T` declared in `plugins`.
    ///
    /// Each declared type is processed in name order: its plugin is loaded,
    /// its factory looked up for argument type `A`, and the manufactured
    /// instance added. A failure at any step skips only that type and is
    /// returned in the report. Types declared without a plugin are skipped
    /// silently.
    pub fn discover<A>(&mut self, plugins: &PluginRegistry, args: &A) -> Vec<PluginError>
    where
        T: 'static,
        A: ?Sized + 'static,
    {
        let mut failures = Vec::new();
        for entry in plugins.derived_types::<T>() {
            let Some(plugin) = entry.plugin() else {
                trace!(extension = entry.type_name(), "no plugin declared; skipping");
                continue;
            };

            if let Err(reason) = plugin.load() {
                let error = PluginError::LoadFailed {
                    plugin: plugin.name().to_string(),
                    type_name: entry.type_name().to_string(),
                    reason,
                };
                warn!(error = %error, "extension discovery failed");
                failures.push(error);
                continue;
            }

            let Some(factory) = entry.factory::<T, A>() else {
                let error = PluginError::FactoryMissing {
                    plugin: plugin.name().to_string(),
                    type_name: entry.type_name().to_string(),
                };
                warn!(error = %error, "extension discovery failed");
                failures.push(error);
                continue;
            };

            match factory.manufacture(args) {
                Some(item) => {
                    self.insert(item);
                }
                None => {
                    let error = PluginError::ManufactureFailed {
                        plugin: plugin.name().to_string(),
                        type_name: entry.type_name().to_string(),
                    };
                    warn!(error = %error, "extension discovery failed");
                    failures.push(error);
                }
            }
        }
        failures
    }
}
