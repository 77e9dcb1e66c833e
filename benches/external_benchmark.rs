//! Benchmarks for wrapping host objects and finalizing them.
//!
//! Measures:
//! - Wrap + unwrap of a rooted external
//! - Full collection of N unreachable externals (both passes + drain)

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use external_bridge::engine::Value;
use external_bridge::{ExternalRef, Global, HostObject, Isolate, IsolateLimits};
use std::hint::black_box;

fn bench_wrap_unwrap(c: &mut Criterion) {
    let mut isolate = Isolate::new(IsolateLimits::default());
    let object = HostObject::new(vec![0u8; 64]);

    c.bench_function("wrap_unwrap", |b| {
        b.iter(|| {
            let external = ExternalRef::new(&mut isolate, object.clone()).unwrap();
            let _root = Global::<Value>::new(&isolate, external.handle()).unwrap();
            black_box(external.value(&isolate).unwrap());
        })
    });
}

fn bench_collect_unreachable(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect_unreachable");

    for count in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut isolate = Isolate::new(IsolateLimits::default());
            b.iter(|| {
                for i in 0..count {
                    ExternalRef::new(&mut isolate, HostObject::new(i)).unwrap();
                }
                black_box(isolate.collect_garbage());
                black_box(isolate.process_pending_releases());
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_wrap_unwrap, bench_collect_unreachable);
criterion_main!(benches);
