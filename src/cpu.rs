//! CPU usage by delta sampling.
//!
//! The first sample for a pid only records a baseline and reports 0.0. State
//! is keyed by pid alone, so a reused pid sampled across a long gap may show a
//! spike at the reuse boundary.

use crate::error::{ProcError, Result};
use crate::model::Pid;
use crate::platform::{CpuTimes, PlatformAdapter};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct CpuSample {
    times: CpuTimes,
    wall: Instant,
    processors: usize,
}

pub struct CpuUsageTracker {
    adapter: Arc<dyn PlatformAdapter>,
    samples: Mutex<HashMap<Pid, CpuSample>>,
}

impl CpuUsageTracker {
    pub fn new(adapter: Arc<dyn PlatformAdapter>) -> Self {
        Self {
            adapter,
            samples: Mutex::new(HashMap::new()),
        }
    }

    /// Sample `pid` now. `NotFound` if it exited, which also drops its baseline.
    /// A read that raced with exit (`TransientRead`) keeps the baseline and is
    /// returned as is, so the caller can retry.
    pub fn sample(&self, pid: Pid) -> Result<f64> {
        match self.adapter.cpu_times(pid) {
            Ok(times) => Ok(self.record(pid, times, Instant::now())),
            Err(ProcError::NotFound(_)) => {
                if self.forget(pid) {
                    debug!(pid, "process gone, dropped cpu baseline");
                }
                Err(ProcError::NotFound(pid))
            }
            Err(e) => Err(e),
        }
    }

    /// Fold an externally obtained reading into the tracker and return usage.
    pub fn record(&self, pid: Pid, times: CpuTimes, wall: Instant) -> f64 {
        let processors = self.adapter.processor_count().max(1);
        let current = CpuSample {
            times,
            wall,
            processors,
        };
        let previous = self
            .samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pid, current);
        match previous {
            Some(prev) => usage_between(&prev, &current),
            None => 0.0,
        }
    }

    /// Drop the baseline for `pid`; returns whether one existed.
    pub fn forget(&self, pid: Pid) -> bool {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pid)
            .is_some()
    }

    pub fn is_tracked(&self, pid: Pid) -> bool {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn processor_count(&self) -> usize {
        self.adapter.processor_count().max(1)
    }
}

/// Percentage of processor time between two samples, scaled by the
/// processor count of the baseline and clamped to `[0, 100 * cores]`.
pub fn usage_percent(cpu_delta_secs: f64, wall_delta_secs: f64, processors: usize) -> f64 {
    let cores = processors.max(1) as f64;
    if wall_delta_secs.is_nan() || wall_delta_secs <= 0.0 || !cpu_delta_secs.is_finite() {
        return 0.0;
    }
    let usage = (cpu_delta_secs / wall_delta_secs) / cores * 100.0;
    usage.clamp(0.0, 100.0 * cores)
}

fn usage_between(prev: &CpuSample, current: &CpuSample) -> f64 {
    let prev_total = prev.times.total().as_secs_f64();
    let cur_total = current.times.total().as_secs_f64();
    // counters can go backwards on reset; the clamp absorbs it
    let cpu_delta = cur_total - prev_total;
    let wall_delta = current
        .wall
        .saturating_duration_since(prev.wall)
        .as_secs_f64();
    usage_percent(cpu_delta, wall_delta, prev.processors)
}
