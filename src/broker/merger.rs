//! Per-transaction notice buffer.

use std::collections::HashMap;

use tracing::trace;

use crate::center::NoticeCenter;
use crate::notice::{AnyNotice, NoticeTag};
use crate::predicate::CapturePredicate;

type NoticeList = Vec<Box<dyn AnyNotice>>;

/// Buffer for one transaction level.
///
/// Notices are grouped by type tag. Order is preserved inside a group; the
/// order between groups is unspecified.
#[derive(Debug, Default)]
pub(crate) struct NoticeMerger {
    notices: HashMap<NoticeTag, NoticeList>,
    predicate: CapturePredicate,
}

impl NoticeMerger {
    pub(crate) fn new(predicate: CapturePredicate) -> Self {
        Self {
            notices: HashMap::new(),
            predicate,
        }
    }

    /// Buffer `notice` if the predicate captures it. Returns false if dropped.
    pub(crate) fn add(&mut self, notice: Box<dyn AnyNotice>) -> bool {
        if !self.predicate.capture(notice.as_ref()) {
            trace!(notice = %notice.tag(), "notice not captured by transaction");
            return false;
        }
        self.notices.entry(notice.tag()).or_default().push(notice);
        true
    }

    /// Move every buffered notice of `child` to the back of the matching group.
    pub(crate) fn join(&mut self, child: &mut NoticeMerger) {
        for (tag, mut source) in child.notices.drain() {
            self.notices.entry(tag).or_default().append(&mut source);
        }
    }

    /// Collapse each mergeable group into its first notice.
    pub(crate) fn merge(&mut self) {
        for notices in self.notices.values_mut() {
            if notices.len() < 2 || !notices[0].is_mergeable() {
                continue;
            }
            let rest: NoticeList = notices.drain(1..).collect();
            let first = &mut notices[0];
            for next in rest {
                first.merge_boxed(next);
            }
        }
    }

    /// Post-process every notice left after [`merge`](Self::merge): the
    /// survivor of a mergeable group, or each notice of an unmergeable one.
    pub(crate) fn post_process(&mut self) {
        for notice in self.notices.values_mut().flatten() {
            notice.post_process();
        }
    }

    /// Emit every remaining notice to `center`, consuming the buffer.
    pub(crate) fn send(self, center: &NoticeCenter) -> usize {
        let mut sent = 0;
        for (_, notices) in self.notices {
            for notice in notices {
                notice.send_to(center);
                sent += 1;
            }
        }
        sent
    }

    /// Number of buffered notices across all groups.
    pub(crate) fn len(&self) -> usize {
        self.notices.values().map(Vec::len).sum()
    }

    /// Number of buffered notices of type `tag`.
    #[cfg(test)]
    pub(crate) fn group_len(&self, tag: NoticeTag) -> usize {
        self.notices.get(&tag).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notice::Notice;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct Log(Vec<u32>);

    impl Notice for Log {
        fn merge(&mut self, other: Self) {
            self.0.extend(other.0);
        }
    }

    #[derive(Debug, Clone)]
    struct Single(u32);

    impl Notice for Single {
        fn is_mergeable(&self) -> bool {
            false
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Stamped(u32);

    impl Notice for Stamped {
        fn post_process(&mut self) {
            self.0 += 100;
        }
    }

    #[derive(Debug, Clone)]
    struct Sealed(u32, bool);

    impl Notice for Sealed {
        fn is_mergeable(&self) -> bool {
            false
        }

        fn post_process(&mut self) {
            self.1 = true;
        }
    }

    #[test]
    fn add_respects_predicate() {
        let mut merger = NoticeMerger::new(CapturePredicate::exclude::<Single>());
        assert!(merger.add(Box::new(Log(vec![1]))));
        assert!(!merger.add(Box::new(Single(1))));
        assert_eq!(merger.len(), 1);
    }

    #[test]
    fn merge_folds_in_arrival_order() {
        let mut merger = NoticeMerger::default();
        for i in 1..=3 {
            merger.add(Box::new(Log(vec![i])));
        }
        merger.merge();
        assert_eq!(merger.group_len(NoticeTag::of::<Log>()), 1);

        let center = NoticeCenter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        center.register::<Log, _>(move |log| sink.lock().unwrap().push(log.0.clone()));
        assert_eq!(merger.send(&center), 1);
        assert_eq!(*seen.lock().unwrap(), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn unmergeable_groups_survive() {
        let mut merger = NoticeMerger::default();
        for i in 0..3 {
            merger.add(Box::new(Single(i)));
        }
        merger.merge();
        assert_eq!(merger.group_len(NoticeTag::of::<Single>()), 3);

        let center = NoticeCenter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        center.register::<Single, _>(move |n| sink.lock().unwrap().push(n.0));
        assert_eq!(merger.send(&center), 3);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn join_appends_after_parent() {
        let mut parent = NoticeMerger::default();
        parent.add(Box::new(Log(vec![1])));
        let mut child = NoticeMerger::default();
        child.add(Box::new(Log(vec![2])));
        child.add(Box::new(Single(9)));

        parent.join(&mut child);
        assert_eq!(child.len(), 0);
        assert_eq!(parent.group_len(NoticeTag::of::<Log>()), 2);
        assert_eq!(parent.group_len(NoticeTag::of::<Single>()), 1);

        parent.merge();
        let center = NoticeCenter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        center.register::<Log, _>(move |log| sink.lock().unwrap().push(log.0.clone()));
        parent.send(&center);
        assert_eq!(*seen.lock().unwrap(), vec![vec![1, 2]]);
    }

    #[test]
    fn post_process_runs_once_per_group() {
        let mut merger = NoticeMerger::default();
        merger.add(Box::new(Stamped(1)));
        merger.add(Box::new(Stamped(2)));
        merger.merge();
        merger.post_process();

        let center = NoticeCenter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        center.register::<Stamped, _>(move |n| sink.lock().unwrap().push(n.0));
        merger.send(&center);
        assert_eq!(*seen.lock().unwrap(), vec![101]);
    }

    #[test]
    fn post_process_runs_on_every_unmerged_notice() {
        let mut merger = NoticeMerger::default();
        for i in 0..3 {
            merger.add(Box::new(Sealed(i, false)));
        }
        merger.merge();
        merger.post_process();

        let center = NoticeCenter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        center.register::<Sealed, _>(move |n| sink.lock().unwrap().push((n.0, n.1)));
        assert_eq!(merger.send(&center), 3);
        assert_eq!(*seen.lock().unwrap(), vec![(0, true), (1, true), (2, true)]);
    }
}
