//! Capture predicates used to filter notices during a transaction.

use std::fmt;
use std::sync::Arc;

use crate::notice::{AnyNotice, Notice, NoticeTag};

/// Boolean filter function over a notice.
pub type CapturePredicateFn = dyn Fn(&dyn AnyNotice) -> bool + Send + Sync;

/// Decides which notices a transaction captures.
///
/// A predicate without a function captures everything. Notices that are not
/// captured are dropped: they are neither buffered nor emitted.
#[derive(Clone, Default)]
pub struct CapturePredicate {
    function: Option<Arc<CapturePredicateFn>>,
}

impl CapturePredicate {
    /// Wrap a filter function.
    pub fn new<F>(function: F) -> Self
    where
        F: Fn(&dyn AnyNotice) -> bool + Send + Sync + 'static,
    {
        Self {
            function: Some(Arc::new(function)),
        }
    }

    /// Capture nothing.
    #[must_use]
    pub fn block_all() -> Self {
        Self::new(|_| false)
    }

    /// Capture only notices of type `N`.
    #[must_use]
    pub fn only<N: Notice>() -> Self {
        let tag = NoticeTag::of::<N>();
        Self::new(move |notice| notice.tag() == tag)
    }

    /// Capture everything except notices of type `N`.
    #[must_use]
    pub fn exclude<N: Notice>() -> Self {
        let tag = NoticeTag::of::<N>();
        Self::new(move |notice| notice.tag() != tag)
    }

    /// Returns true if `notice` should be captured.
    #[must_use]
    pub fn capture(&self, notice: &dyn AnyNotice) -> bool {
        self.function.as_ref().map_or(true, |function| function(notice))
    }
}

impl fmt::Debug for CapturePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturePredicate")
            .field("filtered", &self.function.is_some())
            .finish()
    }
}
