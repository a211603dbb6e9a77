//! Inspection and enumeration cost on the native adapter.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use procman::config::InspectorConfig;
use procman::cpu::CpuUsageTracker;
use procman::directory::ProcessDirectory;
use procman::inspector::ProcessInspector;
use procman::platform;
use std::sync::Arc;

fn inspector(options: InspectorConfig) -> Arc<ProcessInspector> {
    let adapter = platform::native();
    let tracker = Arc::new(CpuUsageTracker::new(Arc::clone(&adapter)));
    Arc::new(ProcessInspector::with_options(adapter, tracker, options))
}

fn bench_inspect_self(c: &mut Criterion) {
    let full = inspector(InspectorConfig::default());
    let minimal = inspector(InspectorConfig::minimal());

    c.bench_function("inspect_self_full", |b| b.iter(|| black_box(full.inspect_self())));
    c.bench_function("inspect_self_minimal", |b| {
        b.iter(|| black_box(minimal.inspect_self()))
    });
    c.bench_function("status_self", |b| {
        b.iter(|| black_box(minimal.status(std::process::id())))
    });
}

fn bench_enumerate(c: &mut Criterion) {
    let directory = ProcessDirectory::new(inspector(InspectorConfig::minimal()));

    c.bench_function("enumerate_all", |b| b.iter(|| black_box(directory.enumerate_all())));
    c.bench_function("pids_by_name", |b| {
        b.iter(|| black_box(directory.pids_by_name("init")))
    });
}

criterion_group!(benches, bench_inspect_self, bench_enumerate);
criterion_main!(benches);
