//! CPU delta arithmetic and tracker bookkeeping.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use procman::cpu::{usage_percent, CpuUsageTracker};
use procman::platform::{self, CpuTimes};
use std::time::{Duration, Instant};

fn bench_usage_percent(c: &mut Criterion) {
    c.bench_function("usage_percent", |b| {
        b.iter(|| usage_percent(black_box(0.75), black_box(1.0), black_box(8)))
    });
}

fn bench_record_many_pids(c: &mut Criterion) {
    let tracker = CpuUsageTracker::new(platform::native());
    let start = Instant::now();
    let mut tick = 0u64;

    c.bench_function("record_1000_pids", |b| {
        b.iter(|| {
            tick += 1;
            let wall = start + Duration::from_millis(tick);
            for pid in 0..1000u32 {
                let times = CpuTimes {
                    user: Duration::from_micros(tick * u64::from(pid)),
                    system: Duration::ZERO,
                };
                black_box(tracker.record(pid, times, wall));
            }
        })
    });
}

fn bench_sample_self(c: &mut Criterion) {
    let tracker = CpuUsageTracker::new(platform::native());
    let me = std::process::id();

    c.bench_function("sample_self", |b| b.iter(|| black_box(tracker.sample(me))));
}

criterion_group!(benches, bench_usage_percent, bench_record_many_pids, bench_sample_self);
criterion_main!(benches);
