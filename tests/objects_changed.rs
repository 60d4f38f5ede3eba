use std::collections::BTreeSet;
use std::sync::Arc;

use notice_broker::{
    Broker, Framework, InMemoryHost, NoticeStream, NoticeTransaction, ObjectsChanged,
};

fn observe(framework: &Framework, host: &Arc<InMemoryHost>) -> NoticeStream<ObjectsChanged> {
    Broker::create(framework, host)
        .subscribe::<ObjectsChanged>()
        .unwrap()
}

#[test]
fn resynced_object() {
    let framework = Framework::new();
    let host = InMemoryHost::new();
    host.define("/Foo");
    let stream = observe(&framework, &host);

    host.define("/Bar");

    let received = stream.drain();
    assert_eq!(received.len(), 1);
    let notice = &received[0];
    assert!(!notice.is_resynced("/Foo"));
    assert!(notice.is_resynced("/Bar"));
    assert!(!notice.affects("/Foo"));
    assert!(notice.affects("/Bar"));
}

#[test]
fn changed_info_only() {
    let framework = Framework::new();
    let host = InMemoryHost::new();
    host.define("/Foo");
    host.define("/Bar");
    let stream = observe(&framework, &host);

    host.set_field("/Bar", "comment", "This is a test");

    let received = stream.drain();
    assert_eq!(received.len(), 1);
    let notice = &received[0];
    assert!(!notice.is_changed_info_only("/Foo"));
    assert!(notice.is_changed_info_only("/Bar"));
    assert!(notice.affects("/Bar"));
    assert!(notice.has_changed_fields("/Bar"));
    assert_eq!(
        notice.changed_fields("/Bar"),
        BTreeSet::from(["comment".to_string()])
    );
    assert!(notice.changed_fields("/Incorrect").is_empty());
}

#[test]
fn descendants_outside_transaction_arrive_separately() {
    let framework = Framework::new();
    let host = InMemoryHost::new();
    let stream = observe(&framework, &host);

    host.define("/Foo");
    host.define("/Foo/Bar");

    let received = stream.drain();
    assert_eq!(received.len(), 2);
    assert!(received[1].resynced().contains("/Foo/Bar"));
}

#[test]
fn transaction_keeps_topmost_resync() {
    let framework = Framework::new();
    let host = InMemoryHost::new();
    let stream = observe(&framework, &host);

    {
        let _txn = NoticeTransaction::for_host(&framework, &host).unwrap();
        host.define("/Foo");
        host.define("/Foo/Bar");
        host.set_field("/Foo/Bar", "kind", "mesh");
        host.define("/Baz");
        host.set_field("/Baz", "kind", "light");
    }

    let received = stream.drain();
    assert_eq!(received.len(), 1);
    let notice = &received[0];
    let roots: Vec<&str> = notice.resynced().iter().map(String::as_str).collect();
    assert_eq!(roots, vec!["/Baz", "/Foo"]);
    assert!(notice.changed_info().is_empty());
    assert!(!notice.has_changed_fields("/Foo/Bar"));
}

#[test]
fn info_changes_merge_across_a_transaction() {
    let framework = Framework::new();
    let host = InMemoryHost::new();
    host.define("/A");
    host.define("/B");
    let stream = observe(&framework, &host);

    {
        let _txn = NoticeTransaction::for_host(&framework, &host).unwrap();
        host.set_field("/A", "color", "red");
        host.set_field("/A", "size", "2");
        host.set_field("/B", "color", "blue");
    }

    let received = stream.drain();
    assert_eq!(received.len(), 1);
    let notice = &received[0];
    assert!(notice.resynced().is_empty());
    assert_eq!(notice.changed_info().len(), 2);
    assert_eq!(notice.changed_fields("/A").len(), 2);
    assert_eq!(stream.dropped(), 0);
}

#[test]
fn removal_resyncs_the_subtree_root() {
    let framework = Framework::new();
    let host = InMemoryHost::new();
    host.define("/A");
    host.define("/A/B");
    let stream = observe(&framework, &host);

    host.remove("/A");

    let received = stream.drain();
    assert_eq!(received.len(), 1);
    assert!(received[0].is_resynced("/A/B"));
    assert!(!host.contains("/A/B"));
}
