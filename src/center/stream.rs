use std::any::type_name;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::error::{BrokerError, BrokerResult};

use super::{CenterRef, ListenerKey};

/// A subscription stream for notices of one type.
///
/// Dropping this stream revokes the backing listener.
#[derive(Debug)]
pub struct NoticeStream<N> {
    key: ListenerKey,
    rx: Receiver<N>,
    center: CenterRef,
    dropped: Arc<AtomicU64>,
    unsubscribed: AtomicBool,
}

impl<N> NoticeStream<N> {
    pub(crate) fn new(
        key: ListenerKey,
        rx: Receiver<N>,
        center: CenterRef,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        Self {
            key,
            rx,
            center,
            dropped,
            unsubscribed: AtomicBool::new(false),
        }
    }

    /// The listener key backing this stream.
    #[must_use]
    pub const fn listener_key(&self) -> ListenerKey {
        self.key
    }

    /// Explicit unsubscription.
    ///
    /// Idempotent. Notices already queued stay readable; afterwards the stream
    /// reports disconnection.
    pub fn unsubscribe(&self) {
        if self.unsubscribed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.center.revoke(self.key);
    }

    /// Take the next queued notice, if any.
    pub fn try_recv(&self) -> Option<N> {
        self.rx.try_recv().ok()
    }

    /// Receive the next notice with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> BrokerResult<N> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => BrokerError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => BrokerError::Disconnected {
                notice: type_name::<N>(),
            },
        })
    }

    /// Take every queued notice.
    pub fn drain(&self) -> Vec<N> {
        self.rx.try_iter().collect()
    }

    /// Number of queued notices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Notices dropped because the stream was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<N> Drop for NoticeStream<N> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
