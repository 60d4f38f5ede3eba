use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use notice_broker::{
    Broker, Extension, Framework, FrameworkConfig, Host, HostRef, InMemoryHost, NoticeCenter,
    NoticeTransaction, ObjectsChanged, Plugin, Reporter, ReporterBase, ReporterManager,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone)]
struct ReporterNotice1;

#[derive(Debug, Clone)]
struct ReporterNotice2;

#[derive(Debug, Clone)]
struct ChildNotice;

fn relay<In: 'static, Out: Send + Sync + 'static>(base: &ReporterBase, out: Out) {
    let host = base.host().clone();
    base.listen::<In, _>(move |_| {
        if let Some(host) = host.upgrade() {
            host.notices().send(&out);
        }
    });
}

macro_rules! relay_reporter {
    ($name:ident, $in:ty, $out:expr) => {
        #[derive(Debug)]
        struct $name {
            base: ReporterBase,
        }

        impl From<HostRef> for $name {
            fn from(host: HostRef) -> Self {
                Self {
                    base: ReporterBase::new(host),
                }
            }
        }

        impl Extension for $name {}

        impl Reporter for $name {
            fn register(self: Arc<Self>) {
                relay::<$in, _>(&self.base, $out);
            }

            fn revoke(&self) {
                self.base.revoke();
            }
        }
    };
}

relay_reporter!(TestReporter1, ObjectsChanged, ReporterNotice1);
relay_reporter!(TestReporter2, ObjectsChanged, ReporterNotice2);
relay_reporter!(ChildReporter, ReporterNotice1, ChildNotice);

fn framework_with_reporters(config: FrameworkConfig) -> Framework {
    let framework = Framework::with_config(config);
    let plugin = Plugin::new("test_reporters");
    framework.plugins().define_reporter::<TestReporter1>(&plugin);
    framework.plugins().define_reporter::<TestReporter2>(&plugin);
    framework.plugins().define_reporter::<ChildReporter>(&plugin);
    framework
}

fn count<N: 'static>(center: &NoticeCenter) -> Arc<AtomicUsize> {
    let seen = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&seen);
    center.register::<N, _>(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });
    seen
}

#[test]
fn discovered_reporters_react_to_broker_notices() {
    init_tracing();
    let framework = framework_with_reporters(FrameworkConfig::default());
    let host = InMemoryHost::new();
    let manager = ReporterManager::create(&framework, &host).get().unwrap();
    let _broker = Broker::create(&framework, &host);
    assert_eq!(manager.reporter_count(), 3);

    let first = count::<ReporterNotice1>(host.notices());
    let second = count::<ReporterNotice2>(host.notices());
    let child = count::<ChildNotice>(host.notices());

    host.define("/A");

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert_eq!(child.load(Ordering::SeqCst), 1);
}

#[test]
fn reporters_see_one_notice_per_transaction() {
    init_tracing();
    let framework = framework_with_reporters(FrameworkConfig::default());
    let host = InMemoryHost::new();
    let _handle = ReporterManager::create(&framework, &host);
    let first = count::<ReporterNotice1>(host.notices());

    {
        let _txn = NoticeTransaction::for_host(&framework, &host).unwrap();
        host.define("/A");
        host.define("/B");
        host.set_field("/A", "kind", "mesh");
        assert_eq!(first.load(Ordering::SeqCst), 0);
    }

    assert_eq!(first.load(Ordering::SeqCst), 1);
}

#[test]
fn discovery_can_be_disabled() {
    let framework = framework_with_reporters(FrameworkConfig {
        discover_reporters: false,
        ..FrameworkConfig::default()
    });
    let host = InMemoryHost::new();
    let manager = ReporterManager::create(&framework, &host).get().unwrap();
    assert_eq!(manager.reporter_count(), 0);
    assert!(manager.reporter::<TestReporter1>().is_none());
}

#[test]
fn failing_plugin_is_skipped() {
    init_tracing();
    let framework = framework_with_reporters(FrameworkConfig::default());
    let broken = Plugin::with_loader("broken_reporters", || Err("library not found".to_string()));
    framework.plugins().define_reporter::<ChildReporter>(&broken);
    framework
        .plugins()
        .declare::<dyn Reporter>("UndeclaredFactoryReporter", Some(&Plugin::new("partial")));

    let host = InMemoryHost::new();
    let manager = ReporterManager::create(&framework, &host).get().unwrap();

    assert_eq!(manager.reporter_count(), 2);
    assert!(manager.reporter::<TestReporter1>().is_some());
    assert!(manager.reporter::<TestReporter2>().is_some());
    assert!(manager.reporter::<ChildReporter>().is_none());
}

#[test]
fn managers_are_per_host_and_resettable() {
    let framework = framework_with_reporters(FrameworkConfig::default());
    let a = InMemoryHost::new();
    let b = InMemoryHost::new();
    let _broker = Broker::create(&framework, &a);

    let ha = ReporterManager::create(&framework, &a);
    let ha_again = ReporterManager::create(&framework, &a);
    let hb = ReporterManager::create(&framework, &b);
    assert!(ha.ptr_eq(&ha_again));
    assert!(!ha.ptr_eq(&hb));
    assert_eq!(ReporterManager::count(&framework), 2);

    ha.get().unwrap().reset(&framework);
    assert!(ha.get().unwrap_err().is_expired());
    assert!(hb.get().is_ok());

    ReporterManager::reset_all(&framework);
    ReporterManager::reset_all(&framework);
    assert!(hb.is_expired());
    assert_eq!(ReporterManager::count(&framework), 0);

    let notices = count::<ReporterNotice1>(a.notices());
    a.define("/A");
    assert_eq!(notices.load(Ordering::SeqCst), 0);
}
