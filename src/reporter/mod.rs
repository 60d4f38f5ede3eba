//! Reporters react to broker notices for side effects.
//!
//! Reporters of one host are owned by that host's [`ReporterManager`], which
//! discovers them from the plugin table when it is created and revokes their
//! listeners when it is reset.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::center::ListenerKeys;
use crate::collector::{Collector, Extension, Upcast};
use crate::error::{BrokerError, BrokerResult};
use crate::framework::Framework;
use crate::host::HostRef;
use crate::plugin::ExtensionFactory;
use crate::registry::{Handle, RegistryEntry};

/// Extension observing notices emitted on a host.
pub trait Reporter: Extension {
    /// Start listening. Called once when the reporter joins its manager.
    fn register(self: Arc<Self>);

    /// Stop listening.
    fn revoke(&self);
}

impl<R: Reporter> Upcast<dyn Reporter> for R {
    fn upcast(self: Arc<Self>) -> Arc<dyn Reporter> {
        self
    }
}

/// Factory signature for reporters declared in the plugin table.
pub type ReporterFactory = dyn ExtensionFactory<dyn Reporter, HostRef>;

/// State shared by reporter implementations: the observed host and the
/// listeners registered on it.
#[derive(Debug)]
pub struct ReporterBase {
    host: HostRef,
    keys: ListenerKeys,
}

impl ReporterBase {
    /// Create a base observing `host`.
    #[must_use]
    pub fn new(host: HostRef) -> Self {
        Self {
            host,
            keys: ListenerKeys::new(),
        }
    }

    /// Observed host.
    #[must_use]
    pub fn host(&self) -> &HostRef {
        &self.host
    }

    /// Listen for notices of type `N` on the host. Does nothing if the host
    /// is gone.
    pub fn listen<N, F>(&self, listener: F)
    where
        N: Any,
        F: Fn(&N) + Send + Sync + 'static,
    {
        if let Some(host) = self.host.upgrade() {
            self.keys.register::<N, F>(host.notices(), listener);
        }
    }

    /// Revoke every listener registered through this base.
    pub fn revoke(&self) {
        self.keys.revoke_all();
    }

    /// Number of listeners currently registered.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.keys.len()
    }
}

/// Per-host owner of reporters.
pub struct ReporterManager {
    host: HostRef,
    reporters: Mutex<Collector<dyn Reporter>>,
    detached: AtomicBool,
}

/// Alternative name used by embedders for the reporter manager.
pub type Inspector = ReporterManager;

impl fmt::Debug for ReporterManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReporterManager")
            .field("host", &self.host)
            .field("reporters", &*self.lock())
            .field("detached", &self.detached.load(Ordering::SeqCst))
            .finish()
    }
}

impl RegistryEntry for ReporterManager {
    type Context = Framework;

    fn construct(host: HostRef, framework: &Framework) -> Arc<Self> {
        let mut collector = Collector::<dyn Reporter>::new();
        if framework.config().discover_reporters {
            let failures = collector.discover(framework.plugins(), &host);
            if !failures.is_empty() {
                debug!(failed = failures.len(), "reporter discovery incomplete");
            }
        }

        let reporters = collector.items();
        let manager = Arc::new(Self {
            host,
            reporters: Mutex::new(collector),
            detached: AtomicBool::new(false),
        });
        for reporter in reporters {
            reporter.register();
        }
        debug!(reporters = manager.reporter_count(), "reporter manager created");
        manager
    }

    fn detach(&self) {
        let reporters = {
            let mut reporters = self.lock();
            if self.detached.swap(true, Ordering::SeqCst) {
                return;
            }
            std::mem::take(&mut *reporters)
        };
        for reporter in reporters.items() {
            reporter.revoke();
        }
        debug!(revoked = reporters.len(), "reporter manager detached");
    }
}

impl ReporterManager {
    /// Manager for `host`, created on first use.
    ///
    /// The returned handle stays valid until the manager is reset; after that
    /// [`Handle::get`] fails with `BrokerError::ExpiredHandle`.
    pub fn create(framework: &Framework, host: impl Into<HostRef>) -> Handle<Self> {
        Handle::new(&framework.managers().create(&host.into(), framework))
    }

    /// Number of managers held by `framework`.
    #[must_use]
    pub fn count(framework: &Framework) -> usize {
        framework.managers().len()
    }

    /// Drop the manager of `host`, if any.
    pub fn reset_host(framework: &Framework, host: impl Into<HostRef>) {
        framework.managers().remove(&host.into());
    }

    /// Drop every manager held by `framework`.
    pub fn reset_all(framework: &Framework) {
        framework.managers().clear();
    }

    /// Drop this manager from `framework` and revoke its reporters.
    pub fn reset(&self, framework: &Framework) {
        framework.managers().remove_entry(&self.host, self);
        self.detach();
    }

    /// Observed host.
    #[must_use]
    pub fn host(&self) -> &HostRef {
        &self.host
    }

    fn lock(&self) -> MutexGuard<'_, Collector<dyn Reporter>> {
        self.reporters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of reporters owned by this manager.
    #[must_use]
    pub fn reporter_count(&self) -> usize {
        self.lock().len()
    }

    /// Reporter of concrete type `R`.
    #[must_use]
    pub fn reporter<R: Reporter>(&self) -> Option<Arc<R>> {
        self.lock().get::<R>()
    }

    /// Reporter stored under `identifier`.
    #[must_use]
    pub fn reporter_by_id(&self, identifier: &str) -> Option<Arc<dyn Reporter>> {
        self.lock().get_by_id(identifier)
    }

    /// Add reporter `R` and register it immediately. A reporter with the same
    /// identifier is revoked and replaced.
    ///
    /// # Errors
    /// `BrokerError::ExpiredHandle` if the manager has been reset.
    pub fn add_reporter<R>(&self) -> BrokerResult<Arc<R>>
    where
        R: Reporter + From<HostRef>,
    {
        let expired = || BrokerError::ExpiredHandle {
            type_name: "ReporterManager",
        };
        let reporter = Arc::new(R::from(self.host.clone()));
        let item: Arc<dyn Reporter> = Arc::clone(&reporter) as Arc<dyn Reporter>;
        let previous = {
            let mut reporters = self.lock();
            if self.detached.load(Ordering::SeqCst) {
                return Err(expired());
            }
            reporters.insert(Arc::clone(&item))
        };
        if let Some(previous) = previous {
            previous.revoke();
        }
        item.register();

        if self.detached.load(Ordering::SeqCst) {
            reporter.revoke();
            return Err(expired());
        }
        Ok(reporter)
    }
}

impl Drop for ReporterManager {
    fn drop(&mut self) {
        let reporters = self.reporters.get_mut().unwrap_or_else(PoisonError::into_inner);
        for reporter in reporters.items() {
            reporter.revoke();
        }
    }
}
