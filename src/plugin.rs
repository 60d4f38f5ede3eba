//! Static plugin table used to discover extensions.
//!
//! Extension types are declared at process start against the base type they
//! extend (`dyn Dispatcher`, `dyn Reporter`, ...). Each declaration names the
//! [`Plugin`] providing it and, usually, a factory able to build an instance
//! from the arguments a [`crate::Collector`] supplies during discovery.

use std::any::{type_name, Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::debug;

use crate::dispatcher::{BrokerRef, Dispatcher};
use crate::host::HostRef;
use crate::reporter::Reporter;

type Loader = dyn Fn() -> Result<(), String> + Send + Sync;

/// Unit of code providing extension types.
///
/// A plugin must be loaded before its types are manufactured. Statically
/// linked plugins always load; a plugin built with a custom loader runs it at
/// most once and caches the outcome.
pub struct Plugin {
    name: String,
    loader: Option<Arc<Loader>>,
    loaded: OnceLock<Result<(), String>>,
}

impl Plugin {
    /// Statically linked plugin.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            loader: None,
            loaded: OnceLock::new(),
        })
    }

    /// Plugin whose load step runs `loader`.
    pub fn with_loader<F>(name: impl Into<String>, loader: F) -> Arc<Self>
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.into(),
            loader: Some(Arc::new(loader)),
            loaded: OnceLock::new(),
        })
    }

    /// Plugin name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load the plugin, running its loader on first call.
    ///
    /// # Errors
    /// The reason reported by the loader.
    pub fn load(&self) -> Result<(), String> {
        self.loaded
            .get_or_init(|| {
                let outcome = self.loader.as_ref().map_or(Ok(()), |loader| loader());
                debug!(plugin = %self.name, ok = outcome.is_ok(), "plugin loaded");
                outcome
            })
            .clone()
    }

    /// Returns true once a load attempt succeeded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self.loaded.get(), Some(Ok(())))
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("loaded", &self.loaded.get())
            .finish_non_exhaustive()
    }
}

/// Builds an extension of base type `T` from discovery arguments `A`.
pub trait ExtensionFactory<T: ?Sized, A: ?Sized>: Send + Sync {
    /// Manufacture a new instance. `None` reports a manufacture failure.
    fn manufacture(&self, args: &A) -> Option<Arc<T>>;
}

impl<T, A, F> ExtensionFactory<T, A> for F
where
    T: ?Sized,
    A: ?Sized,
    F: Fn(&A) -> Option<Arc<T>> + Send + Sync,
{
    fn manufacture(&self, args: &A) -> Option<Arc<T>> {
        self(args)
    }
}

#[derive(Clone)]
struct TypeRecord {
    plugin: Option<Arc<Plugin>>,
    // Holds an `Arc<dyn ExtensionFactory<T, A>>`.
    factory: Option<Arc<dyn Any + Send + Sync>>,
}

/// One extension type known to the plugin table.
#[derive(Clone)]
pub struct PluginEntry {
    type_name: String,
    record: TypeRecord,
}

impl PluginEntry {
    /// Name the type was declared under.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Plugin providing the type, if any.
    #[must_use]
    pub fn plugin(&self) -> Option<&Arc<Plugin>> {
        self.record.plugin.as_ref()
    }

    /// Factory building a `T` from `A`, if one was declared with these types.
    #[must_use]
    pub fn factory<T, A>(&self) -> Option<Arc<dyn ExtensionFactory<T, A>>>
    where
        T: ?Sized + 'static,
        A: ?Sized + 'static,
    {
        self.record
            .factory
            .as_ref()?
            .downcast_ref::<Arc<dyn ExtensionFactory<T, A>>>()
            .cloned()
    }
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("type_name", &self.type_name)
            .field("plugin", &self.record.plugin.as_ref().map(|p| p.name()))
            .field("has_factory", &self.record.factory.is_some())
            .finish()
    }
}

type TypeTable = HashMap<TypeId, BTreeMap<String, TypeRecord>>;

/// Registration table mapping base types to their known extension types.
#[derive(Default)]
pub struct PluginRegistry {
    types: RwLock<TypeTable>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("types", &self.len())
            .finish()
    }
}

impl PluginRegistry {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name` as an extension of `T` provided by `plugin`, built by
    /// `factory`. A later declaration of the same name replaces the earlier one.
    pub fn define<T, A, F>(&self, name: impl Into<String>, plugin: &Arc<Plugin>, factory: F)
    where
        T: ?Sized + 'static,
        A: ?Sized + 'static,
        F: ExtensionFactory<T, A> + 'static,
    {
        let factory: Arc<dyn ExtensionFactory<T, A>> = Arc::new(factory);
        self.insert::<T>(
            name.into(),
            TypeRecord {
                plugin: Some(Arc::clone(plugin)),
                factory: Some(Arc::new(factory)),
            },
        );
    }

    /// Declare a type known to the table but without a factory.
    ///
    /// With `plugin` set, discovery reports a missing factory for it; without
    /// one, the type is skipped silently.
    pub fn declare<T>(&self, name: impl Into<String>, plugin: Option<&Arc<Plugin>>)
    where
        T: ?Sized + 'static,
    {
        self.insert::<T>(
            name.into(),
            TypeRecord {
                plugin: plugin.cloned(),
                factory: None,
            },
        );
    }

    /// Declare dispatcher `D`, built from the broker it serves.
    pub fn define_dispatcher<D>(&self, plugin: &Arc<Plugin>)
    where
        D: Dispatcher + From<BrokerRef>,
    {
        self.define::<dyn Dispatcher, BrokerRef, _>(
            type_name::<D>(),
            plugin,
            |broker: &BrokerRef| -> Option<Arc<dyn Dispatcher>> {
                Some(Arc::new(D::from(broker.clone())))
            },
        );
    }

    /// Declare reporter `R`, built from the host it observes.
    pub fn define_reporter<R>(&self, plugin: &Arc<Plugin>)
    where
        R: Reporter + From<HostRef>,
    {
        self.define::<dyn Reporter, HostRef, _>(
            type_name::<R>(),
            plugin,
            |host: &HostRef| -> Option<Arc<dyn Reporter>> { Some(Arc::new(R::from(host.clone()))) },
        );
    }

    /// Every type declared for base `T`, sorted by name.
    #[must_use]
    pub fn derived_types<T: ?Sized + 'static>(&self) -> Vec<PluginEntry> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<T>())
            .map(|records| {
                records
                    .iter()
                    .map(|(name, record)| PluginEntry {
                        type_name: name.clone(),
                        record: record.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total number of declared types across all bases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    /// Returns true if nothing has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert<T: ?Sized + 'static>(&self, name: String, record: TypeRecord) {
        debug!(
            base = type_name::<T>(),
            extension = %name,
            plugin = record.plugin.as_ref().map(|p| p.name()),
            "extension type declared"
        );
        self.types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(TypeId::of::<T>())
            .or_default()
            .insert(name, record);
    }
}
