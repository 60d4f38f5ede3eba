use std::sync::Arc;

use crate::error::BrokerResult;
use crate::framework::Framework;
use crate::host::HostRef;
use crate::predicate::CapturePredicate;

use super::Broker;

/// Opens a transaction on construction and closes it when dropped, including
/// during unwinding.
///
/// ```
/// use notice_broker::{Broker, Framework, InMemoryHost, NoticeTransaction};
///
/// let framework = Framework::new();
/// let host = InMemoryHost::new();
/// {
///     let _txn = NoticeTransaction::for_host(&framework, &host).unwrap();
///     host.define("/A");
///     host.define("/B");
/// } // one consolidated ObjectsChanged is emitted here
/// ```
#[must_use = "the transaction closes as soon as the guard is dropped"]
#[derive(Debug)]
pub struct NoticeTransaction {
    broker: Arc<Broker>,
}

impl NoticeTransaction {
    /// Open a transaction capturing every notice.
    ///
    /// # Errors
    /// `BrokerError::ExpiredHandle` if `broker` has been reset.
    pub fn new(broker: &Arc<Broker>) -> BrokerResult<Self> {
        Self::with_predicate(broker, CapturePredicate::default())
    }

    /// Open a transaction filtered by `predicate`.
    ///
    /// # Errors
    /// `BrokerError::ExpiredHandle` if `broker` has been reset.
    pub fn with_predicate(broker: &Arc<Broker>, predicate: CapturePredicate) -> BrokerResult<Self> {
        broker.begin_transaction_with(predicate)?;
        Ok(Self {
            broker: Arc::clone(broker),
        })
    }

    /// Open a transaction on the broker of `host`, creating it if needed.
    ///
    /// # Errors
    /// `BrokerError::ExpiredHandle` if the broker is reset concurrently.
    pub fn for_host(framework: &Framework, host: impl Into<HostRef>) -> BrokerResult<Self> {
        Self::new(&Broker::create(framework, host))
    }

    /// Broker the transaction is open on.
    #[must_use]
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }
}

impl Drop for NoticeTransaction {
    fn drop(&mut self) {
        self.broker.end_transaction();
    }
}
