//! Transaction engine.
//!
//! A [`Broker`] sits between one host and its observers. Outside a
//! transaction every notice is delivered immediately to the host's notice
//! center. Inside a transaction notices are buffered per level; closing the
//! outermost level merges each type group, post-processes it and emits the
//! consolidated result. Closing a nested level only hands its buffer to the
//! enclosing one.
//!
//! Resetting a broker detaches it: its dispatchers stop listening and every
//! later operation fails with [`BrokerError::ExpiredHandle`].

pub(crate) mod merger;
/// Scoped transaction guard.
pub mod transaction;

use std::any::type_name;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::center::NoticeStream;
use crate::collector::Collector;
use crate::dispatcher::{BrokerRef, Dispatcher, HostDispatcher};
use crate::error::{BrokerError, BrokerResult};
use crate::framework::Framework;
use crate::host::HostRef;
use crate::notice::{AnyNotice, Notice};
use crate::predicate::CapturePredicate;
use crate::registry::RegistryEntry;

use merger::NoticeMerger;

pub use transaction::NoticeTransaction;

/// Per-host notice broker.
pub struct Broker {
    host: HostRef,
    stream_capacity: usize,
    mergers: Mutex<Vec<NoticeMerger>>,
    dispatchers: Mutex<Collector<dyn Dispatcher>>,
    detached: AtomicBool,
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("host", &self.host)
            .field("depth", &self.transaction_depth())
            .field("detached", &self.is_detached())
            .field("dispatchers", &*self.lock_dispatchers())
            .finish()
    }
}

impl RegistryEntry for Broker {
    type Context = Framework;

    fn construct(host: HostRef, framework: &Framework) -> Arc<Self> {
        let broker = Arc::new(Self {
            host,
            stream_capacity: framework.config().stream_capacity,
            mergers: Mutex::new(Vec::new()),
            dispatchers: Mutex::new(Collector::new()),
            detached: AtomicBool::new(false),
        });
        broker.install_dispatchers(framework);
        broker
    }

    fn detach(&self) {
        let discarded = {
            let mut mergers = self.lock_mergers();
            if self.detached.swap(true, Ordering::SeqCst) {
                return;
            }
            mergers.drain(..).map(|merger| merger.len()).sum::<usize>()
        };

        let dispatchers = std::mem::take(&mut *self.lock_dispatchers());
        for dispatcher in dispatchers.items() {
            dispatcher.revoke();
        }
        debug!(discarded, "broker detached");
    }
}

impl Broker {
    /// Broker for `host`, created on first use.
    ///
    /// Repeated calls with the same live host return the same broker until it
    /// is reset.
    pub fn create(framework: &Framework, host: impl Into<HostRef>) -> Arc<Self> {
        framework.brokers().create(&host.into(), framework)
    }

    /// Number of brokers held by `framework`, expired hosts included until
    /// the next creation.
    #[must_use]
    pub fn count(framework: &Framework) -> usize {
        framework.brokers().len()
    }

    /// Detach every broker held by `framework`.
    pub fn reset_all(framework: &Framework) {
        framework.brokers().clear();
    }

    /// Detach this broker from `framework`. The next [`Broker::create`] for
    /// the same host builds a fresh one; this instance stops forwarding host
    /// edits and rejects further use.
    pub fn reset(&self, framework: &Framework) {
        framework.brokers().remove_entry(&self.host, self);
        self.detach();
    }

    /// Returns true once the broker has been reset.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    fn ensure_attached(&self) -> BrokerResult<()> {
        if self.is_detached() {
            return Err(BrokerError::ExpiredHandle {
                type_name: "Broker",
            });
        }
        Ok(())
    }

    /// Host observed by this broker.
    #[must_use]
    pub fn host(&self) -> &HostRef {
        &self.host
    }

    fn lock_mergers(&self) -> MutexGuard<'_, Vec<NoticeMerger>> {
        self.mergers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_dispatchers(&self) -> MutexGuard<'_, Collector<dyn Dispatcher>> {
        self.dispatchers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true while at least one transaction is open.
    #[must_use]
    pub fn is_in_transaction(&self) -> bool {
        !self.lock_mergers().is_empty()
    }

    /// Number of open transaction levels.
    #[must_use]
    pub fn transaction_depth(&self) -> usize {
        self.lock_mergers().len()
    }

    /// Open a transaction level capturing every notice.
    ///
    /// # Errors
    /// `BrokerError::ExpiredHandle` if the broker has been reset.
    pub fn begin_transaction(&self) -> BrokerResult<()> {
        self.begin_transaction_with(CapturePredicate::default())
    }

    /// Open a transaction level that buffers only notices accepted by
    /// `predicate`. Rejected notices are discarded.
    ///
    /// # Errors
    /// `BrokerError::ExpiredHandle` if the broker has been reset.
    pub fn begin_transaction_with(&self, predicate: CapturePredicate) -> BrokerResult<()> {
        let mut mergers = self.lock_mergers();
        self.ensure_attached()?;
        mergers.push(NoticeMerger::new(predicate));
        debug!(depth = mergers.len(), "transaction opened");
        Ok(())
    }

    /// Open a transaction level filtered by `function`.
    ///
    /// # Errors
    /// `BrokerError::ExpiredHandle` if the broker has been reset.
    pub fn begin_transaction_fn<F>(&self, function: F) -> BrokerResult<()>
    where
        F: Fn(&dyn AnyNotice) -> bool + Send + Sync + 'static,
    {
        self.begin_transaction_with(CapturePredicate::new(function))
    }

    /// Close the innermost transaction level. Does nothing if none is open,
    /// which is always the case once the broker has been reset.
    ///
    /// Closing a nested level moves its buffered notices to the enclosing
    /// level. Closing the outermost level merges, post-processes and emits
    /// everything buffered.
    pub fn end_transaction(&self) {
        let mut merger = {
            let mut mergers = self.lock_mergers();
            let Some(mut merger) = mergers.pop() else {
                trace!("end_transaction without an open transaction");
                return;
            };
            if let Some(parent) = mergers.last_mut() {
                parent.join(&mut merger);
                debug!(depth = mergers.len(), "nested transaction closed");
                return;
            }
            merger
        };

        let buffered = merger.len();
        merger.merge();
        merger.post_process();

        match self.host.upgrade() {
            Some(host) => {
                let sent = merger.send(host.notices());
                debug!(buffered, sent, "transaction closed");
            }
            None => debug!(buffered, "host expired; consolidated notices dropped"),
        }
    }

    /// Send `notice` through the broker.
    ///
    /// # Errors
    /// `BrokerError::ExpiredHandle` if the broker has been reset.
    pub fn send<N: Notice>(&self, notice: N) -> BrokerResult<()> {
        self.send_boxed(Box::new(notice))
    }

    /// Send a type-erased notice through the broker.
    ///
    /// Inside a transaction the notice is offered to the innermost level;
    /// otherwise it is delivered immediately. A notice for a destroyed host
    /// is dropped.
    ///
    /// # Errors
    /// `BrokerError::ExpiredHandle` if the broker has been reset.
    pub fn send_boxed(&self, notice: Box<dyn AnyNotice>) -> BrokerResult<()> {
        {
            let mut mergers = self.lock_mergers();
            self.ensure_attached()?;
            if let Some(top) = mergers.last_mut() {
                top.add(notice);
                return Ok(());
            }
        }

        match self.host.upgrade() {
            Some(host) => {
                notice.send_to(host.notices());
            }
            None => debug!(notice = %notice.tag(), "host expired; notice dropped"),
        }
        Ok(())
    }

    /// Open a stream of notices of type `N` emitted on the host.
    ///
    /// # Errors
    /// `BrokerError::ExpiredHandle` if the broker has been reset,
    /// `BrokerError::HostExpired` if the host has been destroyed.
    pub fn subscribe<N>(&self) -> BrokerResult<NoticeStream<N>>
    where
        N: Notice + Clone,
    {
        self.ensure_attached()?;
        let host = self.host.upgrade().ok_or(BrokerError::HostExpired {
            notice: type_name::<N>(),
        })?;
        Ok(host.notices().stream::<N>(self.stream_capacity))
    }

    /// Dispatcher stored under `identifier`.
    #[must_use]
    pub fn dispatcher(&self, identifier: &str) -> Option<Arc<dyn Dispatcher>> {
        self.lock_dispatchers().get_by_id(identifier)
    }

    /// Dispatcher of concrete type `D`.
    #[must_use]
    pub fn dispatcher_of<D: Dispatcher>(&self) -> Option<Arc<D>> {
        self.lock_dispatchers().get::<D>()
    }

    /// Number of dispatchers attached to this broker.
    #[must_use]
    pub fn dispatcher_count(&self) -> usize {
        self.lock_dispatchers().len()
    }

    /// Add dispatcher `D` and register it immediately. A dispatcher with the
    /// same identifier is revoked and replaced.
    ///
    /// # Errors
    /// `BrokerError::ExpiredHandle` if the broker has been reset.
    pub fn add_dispatcher<D>(self: &Arc<Self>) -> BrokerResult<Arc<D>>
    where
        D: Dispatcher + From<BrokerRef>,
    {
        self.ensure_attached()?;
        let dispatcher = Arc::new(D::from(BrokerRef::new(self)));
        let item: Arc<dyn Dispatcher> = Arc::clone(&dispatcher) as Arc<dyn Dispatcher>;
        let previous = self.lock_dispatchers().insert(Arc::clone(&item));
        if let Some(previous) = previous {
            previous.revoke();
        }
        item.register();

        // A reset racing with the insert may have missed the new dispatcher.
        if self.is_detached() {
            dispatcher.revoke();
            return Err(BrokerError::ExpiredHandle {
                type_name: "Broker",
            });
        }
        Ok(dispatcher)
    }

    fn install_dispatchers(self: &Arc<Self>, framework: &Framework) {
        let config = framework.config();
        let args = BrokerRef::new(self);
        let mut collector = Collector::<dyn Dispatcher>::new();

        if config.register_builtin_dispatcher {
            collector.add(HostDispatcher::from(args.clone()));
        }
        if config.discover_dispatchers {
            let failures = collector.discover(framework.plugins(), &args);
            if !failures.is_empty() {
                debug!(failed = failures.len(), "dispatcher discovery incomplete");
            }
        }

        let dispatchers = collector.items();
        *self.lock_dispatchers() = collector;
        for dispatcher in dispatchers {
            dispatcher.register();
        }
        debug!(dispatchers = self.dispatcher_count(), "broker created");
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        let dispatchers = self.dispatchers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for dispatcher in dispatchers.items() {
            dispatcher.revoke();
        }
        let pending = self
            .mergers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        if pending > 0 {
            debug!(pending, "broker dropped with open transactions");
        }
    }
}
