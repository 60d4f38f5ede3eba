//! Broker notice contract.
//!
//! A notice is a typed unit of change information. Concrete notice types
//! implement [`Notice`]; the broker stores and manipulates them through the
//! object-safe [`AnyNotice`] view, which is implemented for every `Notice`.

/// Built-in notices emitted by the host dispatcher.
pub mod builtin;

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::center::NoticeCenter;

pub use builtin::{ContentsChanged, ObjectsChanged};

/// Stable type tag of a notice, used as the grouping key in transactions.
#[derive(Clone, Copy)]
pub struct NoticeTag {
    id: TypeId,
    name: &'static str,
}

impl NoticeTag {
    /// Tag of the notice type `N`.
    #[must_use]
    pub fn of<N: Any>() -> Self {
        Self {
            id: TypeId::of::<N>(),
            name: type_name::<N>(),
        }
    }

    /// Fully qualified type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for NoticeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NoticeTag {}

impl Hash for NoticeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for NoticeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NoticeTag").field(&self.name).finish()
    }
}

impl fmt::Display for NoticeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Behaviour of a concrete notice type.
///
/// Notices are mergeable by default. A mergeable type should override
/// [`Notice::merge`] to fold the content of a later notice into an earlier
/// one; a type that must never be consolidated overrides
/// [`Notice::is_mergeable`] instead.
pub trait Notice: Any + Send + fmt::Debug + Sized {
    /// Whether notices of this type can be consolidated within a transaction.
    fn is_mergeable(&self) -> bool {
        true
    }

    /// Fold `other`, emitted after `self`, into `self`.
    ///
    /// The default keeps `self` unchanged and discards `other`.
    fn merge(&mut self, other: Self) {
        let _ = other;
    }

    /// Finalize the notice once merging is complete, before emission.
    fn post_process(&mut self) {}
}

/// Object-safe view over any [`Notice`].
pub trait AnyNotice: Send + fmt::Debug {
    /// Type tag used for grouping.
    fn tag(&self) -> NoticeTag;

    /// See [`Notice::is_mergeable`].
    fn is_mergeable(&self) -> bool;

    /// Merge a notice of the same type into this one.
    ///
    /// # Panics
    /// If `other` does not have the same type tag as `self`. The broker only
    /// merges notices from the same group, so this indicates a programming
    /// error.
    fn merge_boxed(&mut self, other: Box<dyn AnyNotice>);

    /// See [`Notice::post_process`].
    fn post_process(&mut self);

    /// Deliver this notice to every listener registered on `center`.
    fn send_to(&self, center: &NoticeCenter) -> usize;

    /// Borrow as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Convert into `Any` for downcasting by value.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<N: Notice> AnyNotice for N {
    fn tag(&self) -> NoticeTag {
        NoticeTag::of::<N>()
    }

    fn is_mergeable(&self) -> bool {
        Notice::is_mergeable(self)
    }

    fn merge_boxed(&mut self, other: Box<dyn AnyNotice>) {
        let other_tag = other.tag();
        match other.into_any().downcast::<N>() {
            Ok(other) => Notice::merge(self, *other),
            Err(_) => panic!(
                "cannot merge notice {} into {}",
                other_tag,
                NoticeTag::of::<N>()
            ),
        }
    }

    fn post_process(&mut self) {
        Notice::post_process(self);
    }

    fn send_to(&self, center: &NoticeCenter) -> usize {
        center.send::<N>(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl<'a> dyn AnyNotice + 'a {
    /// Returns true if the notice is of concrete type `N`.
    #[must_use]
    pub fn is<N: Notice>(&self) -> bool {
        self.tag() == NoticeTag::of::<N>()
    }

    /// Downcast to a concrete notice type.
    #[must_use]
    pub fn downcast_ref<N: Notice>(&self) -> Option<&N> {
        self.as_any().downcast_ref::<N>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Counter(u32);

    impl Notice for Counter {
        fn merge(&mut self, other: Self) {
            self.0 += other.0;
        }
    }

    #[derive(Debug)]
    struct Once;

    impl Notice for Once {
        fn is_mergeable(&self) -> bool {
            false
        }
    }

    #[test]
    fn tags_compare_by_type() {
        assert_eq!(NoticeTag::of::<Counter>(), NoticeTag::of::<Counter>());
        assert_ne!(NoticeTag::of::<Counter>(), NoticeTag::of::<Once>());
        assert!(NoticeTag::of::<Counter>().name().ends_with("Counter"));
    }

    #[test]
    fn merge_boxed_folds_same_type() {
        let mut first: Box<dyn AnyNotice> = Box::new(Counter(1));
        first.merge_boxed(Box::new(Counter(2)));
        assert_eq!(first.downcast_ref::<Counter>().map(|c| c.0), Some(3));
    }

    #[test]
    #[should_panic(expected = "cannot merge notice")]
    fn merge_boxed_rejects_other_type() {
        let mut first: Box<dyn AnyNotice> = Box::new(Counter(1));
        first.merge_boxed(Box::new(Once));
    }

    #[test]
    fn mergeable_flag_follows_type() {
        let counter: Box<dyn AnyNotice> = Box::new(Counter::default());
        let once: Box<dyn AnyNotice> = Box::new(Once);
        assert!(counter.is_mergeable());
        assert!(!once.is_mergeable());
        assert!(once.is::<Once>());
    }
}
