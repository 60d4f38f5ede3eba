//! Dispatchers translate a host's native notices into broker notices.
//!
//! A dispatcher listens on the host's [`NoticeCenter`](crate::NoticeCenter)
//! and forwards what it hears through its broker, so the translated notices
//! take part in transactions.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use tracing::trace;

use crate::broker::Broker;
use crate::center::ListenerKeys;
use crate::collector::{Extension, Upcast};
use crate::host::{ContentsEdited, HostRef, ObjectsEdited};
use crate::notice::{ContentsChanged, Notice, ObjectsChanged};
use crate::plugin::ExtensionFactory;

/// Extension translating native host notices into broker notices.
pub trait Dispatcher: Extension {
    /// Start listening. Called once when the dispatcher joins a broker.
    fn register(self: Arc<Self>);

    /// Stop listening. Called when the dispatcher is replaced or its broker
    /// is dropped.
    fn revoke(&self);
}

impl<D: Dispatcher> Upcast<dyn Dispatcher> for D {
    fn upcast(self: Arc<Self>) -> Arc<dyn Dispatcher> {
        self
    }
}

/// Factory signature for dispatchers declared in the plugin table.
pub type DispatcherFactory = dyn ExtensionFactory<dyn Dispatcher, BrokerRef>;

/// Weak reference to the broker a dispatcher serves.
#[derive(Clone)]
pub struct BrokerRef {
    broker: Weak<Broker>,
    host: HostRef,
}

impl BrokerRef {
    /// Reference `broker`.
    #[must_use]
    pub fn new(broker: &Arc<Broker>) -> Self {
        Self {
            broker: Arc::downgrade(broker),
            host: broker.host().clone(),
        }
    }

    /// Upgrade to the broker if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Arc<Broker>> {
        self.broker.upgrade()
    }

    /// Host observed by the broker.
    #[must_use]
    pub fn host(&self) -> &HostRef {
        &self.host
    }

    /// Send `notice` through the broker. Returns false if the broker is gone
    /// or has been reset.
    pub fn send<N: Notice>(&self, notice: N) -> bool {
        self.broker
            .upgrade()
            .is_some_and(|broker| broker.send(notice).is_ok())
    }
}

impl fmt::Debug for BrokerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerRef")
            .field("host", &self.host)
            .field("expired", &(self.broker.strong_count() == 0))
            .finish()
    }
}

/// State shared by dispatcher implementations: the broker they serve and the
/// listeners they registered on the host.
#[derive(Debug)]
pub struct DispatcherBase {
    broker: BrokerRef,
    keys: ListenerKeys,
}

impl DispatcherBase {
    /// Create a base serving `broker`.
    #[must_use]
    pub fn new(broker: BrokerRef) -> Self {
        Self {
            broker,
            keys: ListenerKeys::new(),
        }
    }

    /// Broker served by this dispatcher.
    #[must_use]
    pub fn broker(&self) -> &BrokerRef {
        &self.broker
    }

    /// Listen for native `In` notices on the host and send them through the
    /// broker as `Out`. Does nothing if the host is gone.
    pub fn forward<In, Out>(&self)
    where
        In: Any,
        Out: Notice + for<'a> From<&'a In>,
    {
        let Some(host) = self.broker.host().upgrade() else {
            return;
        };
        let broker = self.broker.clone();
        self.keys.register::<In, _>(host.notices(), move |native| {
            if !broker.send(Out::from(native)) {
                trace!("broker gone or reset; native notice ignored");
            }
        });
    }

    /// Register an arbitrary listener on the host.
    pub fn listen<In, F>(&self, listener: F)
    where
        In: Any,
        F: Fn(&BrokerRef, &In) + Send + Sync + 'static,
    {
        let Some(host) = self.broker.host().upgrade() else {
            return;
        };
        let broker = self.broker.clone();
        self.keys
            .register::<In, _>(host.notices(), move |native| listener(&broker, native));
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

impl From<&ContentsEdited> for ContentsChanged {
    fn from(_: &ContentsEdited) -> Self {
        ContentsChanged
    }
}

impl From<&ObjectsEdited> for ObjectsChanged {
    fn from(edit: &ObjectsEdited) -> Self {
        edit.changed_fields.iter().fold(
            ObjectsChanged::new(edit.resynced.iter().cloned(), edit.changed_info.iter().cloned()),
            |notice, (path, field)| notice.with_changed_field(path.as_str(), field.as_str()),
        )
    }
}

/// Built-in dispatcher seeded into every broker.
///
/// Forwards [`ContentsEdited`] as [`ContentsChanged`] and [`ObjectsEdited`] as
/// [`ObjectsChanged`].
#[derive(Debug)]
pub struct HostDispatcher {
    base: DispatcherBase,
}

impl HostDispatcher {
    /// Identifier of the built-in dispatcher. A plugin dispatcher returning
    /// the same identifier replaces it.
    pub const IDENTIFIER: &'static str = "HostDispatcher";
}

impl From<BrokerRef> for HostDispatcher {
    fn from(broker: BrokerRef) -> Self {
        Self {
            base: DispatcherBase::new(broker),
        }
    }
}

impl Extension for HostDispatcher {
    fn identifier(&self) -> &'static str {
        Self::IDENTIFIER
    }
}

impl Dispatcher for HostDispatcher {
    fn register(self: Arc<Self>) {
        self.base.forward::<ContentsEdited, ContentsChanged>();
        self.base.forward::<ObjectsEdited, ObjectsChanged>();
    }

    fn revoke(&self) {
        self.base.revoke();
    }
}
