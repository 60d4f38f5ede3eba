use std::hint::black_box;
use std::time::Instant;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use notice_broker::{
    Broker, CapturePredicate, Framework, Host, InMemoryHost, Notice, NoticeTransaction,
    ObjectsChanged,
};

#[derive(Debug, Clone)]
struct Counter(u64);

impl Notice for Counter {
    fn merge(&mut self, other: Self) {
        self.0 += other.0;
    }
}

#[derive(Debug, Clone)]
struct Unique;

impl Notice for Unique {
    fn is_mergeable(&self) -> bool {
        false
    }
}

const NOTICES_PER_TXN: u64 = 256;

fn bench_send_outside_transaction(c: &mut Criterion) {
    let framework = Framework::new();
    let host = InMemoryHost::new();
    let broker = Broker::create(&framework, &host);
    host.notices().register::<Counter, _>(|n| {
        black_box(n.0);
    });

    c.bench_function("broker/send_immediate", |b| {
        b.iter(|| broker.send(Counter(1)));
    });
}

fn bench_merge_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("broker_transaction");
    group.throughput(Throughput::Elements(NOTICES_PER_TXN));

    group.bench_function("merge_mergeable", |b| {
        let framework = Framework::new();
        let host = InMemoryHost::new();
        let broker = Broker::create(&framework, &host);
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                broker.begin_transaction().unwrap();
                for i in 0..NOTICES_PER_TXN {
                    broker.send(Counter(i)).unwrap();
                }
                broker.end_transaction();
            }
            start.elapsed()
        });
    });

    group.bench_function("keep_unmergeable", |b| {
        let framework = Framework::new();
        let host = InMemoryHost::new();
        let broker = Broker::create(&framework, &host);
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                broker.begin_transaction().unwrap();
                for _ in 0..NOTICES_PER_TXN {
                    broker.send(Unique).unwrap();
                }
                broker.end_transaction();
            }
            start.elapsed()
        });
    });

    group.bench_function("filtered_out", |b| {
        let framework = Framework::new();
        let host = InMemoryHost::new();
        let broker = Broker::create(&framework, &host);
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                broker.begin_transaction_with(CapturePredicate::exclude::<Counter>()).unwrap();
                for i in 0..NOTICES_PER_TXN {
                    broker.send(Counter(i)).unwrap();
                }
                broker.end_transaction();
            }
            start.elapsed()
        });
    });

    group.finish();
}

fn bench_host_edits(c: &mut Criterion) {
    let mut group = c.benchmark_group("host_edits");
    group.throughput(Throughput::Elements(NOTICES_PER_TXN));

    group.bench_function("define_in_transaction", |b| {
        b.iter_custom(|iters| {
            // Fresh host per sample so object maps do not grow across samples.
            let framework = Framework::new();
            let host = InMemoryHost::new();
            host.notices().register::<ObjectsChanged, _>(|n| {
                black_box(n.resynced().len());
            });

            let start = Instant::now();
            for iter in 0..iters {
                let _txn = NoticeTransaction::for_host(&framework, &host).unwrap();
                for i in 0..NOTICES_PER_TXN {
                    host.define(&format!("/Root{iter}/Child{i}"));
                }
            }
            start.elapsed()
        });
    });

    group.finish();
}

criterion_group!(
    transaction,
    bench_send_outside_transaction,
    bench_merge_throughput,
    bench_host_edits
);
criterion_main!(transaction);
