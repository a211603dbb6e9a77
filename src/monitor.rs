//! Asynchronous per-pid watches.
//!
//! Each watch is one tokio task polling the inspector on a fixed interval.
//! Cancellation is cooperative: `stop` sets a flag that the task checks at
//! every poll boundary, so a stopped watch may stay in flight for up to one
//! interval. Callbacks run under a per-watch delivery gate: once `stop`
//! returns, a callback already running has finished and no new one starts.
//! A status watch whose target exits delivers `"Terminated"` once and removes
//! its own entry.
//!
//! A callback may stop its own watch. Two callbacks that stop each other's
//! watches can deadlock.

use crate::config::MonitorConfig;
use crate::error::{ProcError, Result};
use crate::inspector::ProcessInspector;
use crate::model::{Pid, ProcessResource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Status reported when a watched process is gone.
pub const TERMINATED: &str = "Terminated";

pub type MonitorId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Cpu,
    Memory,
}

impl ResourceKind {
    /// Reading in the unit thresholds are given in: percent or bytes.
    pub fn read(self, resources: &ProcessResource) -> f64 {
        match self {
            ResourceKind::Cpu => resources.cpu_usage,
            ResourceKind::Memory => resources.mem_usage as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WatchKind {
    Status,
    Resource { kind: ResourceKind, threshold: f64 },
    History,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformancePoint {
    pub timestamp: DateTime<Utc>,
    pub cpu_usage: f64,
    pub mem_usage: u64,
    pub vm_usage: u64,
    pub io_read: u64,
    pub io_write: u64,
    pub thread_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceHistory {
    pub pid: Pid,
    pub points: Vec<PerformancePoint>,
}

struct Watch {
    pid: Pid,
    kind: WatchKind,
    cancel: Arc<AtomicBool>,
    gate: Arc<Mutex<()>>,
    last_status: Arc<Mutex<Option<String>>>,
}

/// Handles a watch task keeps for itself.
struct WatchHandles {
    id: MonitorId,
    cancel: Arc<AtomicBool>,
    gate: Arc<Mutex<()>>,
    last_status: Arc<Mutex<Option<String>>>,
}

type Registry = Arc<Mutex<HashMap<MonitorId, Watch>>>;

fn registry(r: &Registry) -> std::sync::MutexGuard<'_, HashMap<MonitorId, Watch>> {
    r.lock().unwrap_or_else(PoisonError::into_inner)
}

thread_local! {
    /// Watch whose callback is running on this thread.
    static DELIVERING: Cell<Option<MonitorId>> = const { Cell::new(None) };
}

struct Delivering(Option<MonitorId>);

impl Delivering {
    fn enter(id: MonitorId) -> Self {
        Self(DELIVERING.with(|d| d.replace(Some(id))))
    }
}

impl Drop for Delivering {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.set(self.0));
    }
}

impl WatchHandles {
    /// Run `callback` unless the watch was cancelled. False when cancelled.
    fn deliver(&self, callback: impl FnOnce()) -> bool {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if self.cancel.load(Ordering::Acquire) {
            return false;
        }
        let _delivering = Delivering::enter(self.id);
        callback();
        true
    }
}

/// Mark `watch` cancelled and wait out a callback in progress, unless that
/// callback is the caller.
fn cancel_watch(id: MonitorId, watch: &Watch) {
    watch.cancel.store(true, Ordering::Release);
    if DELIVERING.with(|d| d.get()) != Some(id) {
        drop(watch.gate.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

/// Injectable registry of running watches. Dropping it stops every watch.
pub struct ProcessMonitor {
    inspector: Arc<ProcessInspector>,
    runtime: Handle,
    config: MonitorConfig,
    next_id: AtomicU64,
    watches: Registry,
}

impl ProcessMonitor {
    pub fn new(inspector: Arc<ProcessInspector>, runtime: Handle) -> Self {
        Self::with_config(inspector, runtime, MonitorConfig::default())
    }

    /// Intervals for [`watch`](Self::watch) and [`history`](Self::history)
    /// come from `config`.
    pub fn with_config(inspector: Arc<ProcessInspector>, runtime: Handle, config: MonitorConfig) -> Self {
        Self {
            inspector,
            runtime,
            config,
            next_id: AtomicU64::new(1),
            watches: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    fn register(&self, pid: Pid, kind: WatchKind) -> WatchHandles {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = Arc::new(AtomicBool::new(false));
        let gate = Arc::new(Mutex::new(()));
        let last_status = Arc::new(Mutex::new(None));
        registry(&self.watches).insert(
            id,
            Watch {
                pid,
                kind,
                cancel: Arc::clone(&cancel),
                gate: Arc::clone(&gate),
                last_status: Arc::clone(&last_status),
            },
        );
        WatchHandles {
            id,
            cancel,
            gate,
            last_status,
        }
    }

    /// [`start`](Self::start) at the configured default interval.
    pub fn watch<F>(&self, pid: Pid, callback: F) -> MonitorId
    where
        F: Fn(Pid, &str) + Send + Sync + 'static,
    {
        self.start(pid, callback, self.config.default_interval())
    }

    /// Watch `pid` for status changes. The first observation is the baseline
    /// and is not reported. Watches on the same pid are independent.
    pub fn start<F>(&self, pid: Pid, callback: F, interval: Duration) -> MonitorId
    where
        F: Fn(Pid, &str) + Send + Sync + 'static,
    {
        let handles = self.register(pid, WatchKind::Status);
        let id = handles.id;
        let inspector = Arc::clone(&self.inspector);
        let watches = Arc::clone(&self.watches);
        let interval = interval.max(Duration::from_millis(1));
        debug!(monitor_id = id, pid, ?interval, "starting status watch");

        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if handles.cancel.load(Ordering::Acquire) {
                    break;
                }
                let worker = Arc::clone(&inspector);
                let observed = tokio::task::spawn_blocking(move || worker.status(pid)).await;
                if handles.cancel.load(Ordering::Acquire) {
                    break;
                }
                let status = match observed {
                    Ok(Ok(status)) if status.is_alive() => status,
                    Ok(Ok(_)) | Ok(Err(ProcError::NotFound(_))) => {
                        // a concurrent stop owns the entry otherwise
                        if registry(&watches).remove(&id).is_none() {
                            break;
                        }
                        *handles.last_status.lock().unwrap_or_else(PoisonError::into_inner) =
                            Some(TERMINATED.to_string());
                        info!(monitor_id = id, pid, "watched process terminated");
                        handles.deliver(|| callback(pid, TERMINATED));
                        break;
                    }
                    Ok(Err(e)) => {
                        debug!(monitor_id = id, pid, error = %e, "status poll failed");
                        continue;
                    }
                    Err(e) => {
                        warn!(monitor_id = id, pid, error = %e, "status poll aborted");
                        registry(&watches).remove(&id);
                        break;
                    }
                };
                let changed = {
                    let mut last = handles.last_status.lock().unwrap_or_else(PoisonError::into_inner);
                    let first = last.is_none();
                    let changed = last.as_deref() != Some(status.as_str());
                    if changed {
                        *last = Some(status.as_str().to_string());
                    }
                    changed && !first
                };
                if changed {
                    debug!(monitor_id = id, pid, %status, "status changed");
                    if !handles.deliver(|| callback(pid, status.as_str())) {
                        break;
                    }
                }
            }
        });
        id
    }

    /// Invoke `callback(pid, kind, value)` on every poll where the reading is
    /// at or above `threshold`. Ends silently when the process exits.
    pub fn start_resource_watch<F>(
        &self,
        pid: Pid,
        kind: ResourceKind,
        threshold: f64,
        callback: F,
        interval: Duration,
    ) -> MonitorId
    where
        F: Fn(Pid, ResourceKind, f64) + Send + Sync + 'static,
    {
        let handles = self.register(pid, WatchKind::Resource { kind, threshold });
        let id = handles.id;
        let inspector = Arc::clone(&self.inspector);
        let watches = Arc::clone(&self.watches);
        let interval = interval.max(Duration::from_millis(1));
        debug!(monitor_id = id, pid, ?kind, threshold, "starting resource watch");

        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if handles.cancel.load(Ordering::Acquire) {
                    break;
                }
                let worker = Arc::clone(&inspector);
                let observed = tokio::task::spawn_blocking(move || worker.resources(pid)).await;
                if handles.cancel.load(Ordering::Acquire) {
                    break;
                }
                match observed {
                    Ok(Ok(resources)) => {
                        let value = kind.read(&resources);
                        if value >= threshold && !handles.deliver(|| callback(pid, kind, value)) {
                            break;
                        }
                    }
                    Ok(Err(e)) if e.is_absent() => {
                        debug!(monitor_id = id, pid, "resource watch target exited");
                        registry(&watches).remove(&id);
                        break;
                    }
                    Ok(Err(e)) => debug!(monitor_id = id, pid, error = %e, "resource poll failed"),
                    Err(e) => {
                        warn!(monitor_id = id, pid, error = %e, "resource poll aborted");
                        registry(&watches).remove(&id);
                        break;
                    }
                }
            }
        });
        id
    }

    /// Sample resources every `interval` for `duration`. Stops early if the
    /// process exits; `NotFound` when not even one sample was taken.
    pub async fn collect_history(
        &self,
        pid: Pid,
        duration: Duration,
        interval: Duration,
    ) -> Result<PerformanceHistory> {
        let handles = self.register(pid, WatchKind::History);
        let id = handles.id;
        let interval = interval.max(Duration::from_millis(1));
        let deadline = tokio::time::Instant::now() + duration;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut points = Vec::new();

        while tokio::time::Instant::now() <= deadline && !handles.cancel.load(Ordering::Acquire) {
            ticker.tick().await;
            let worker = Arc::clone(&self.inspector);
            match tokio::task::spawn_blocking(move || worker.resources(pid)).await {
                Ok(Ok(r)) => points.push(PerformancePoint {
                    timestamp: Utc::now(),
                    cpu_usage: r.cpu_usage,
                    mem_usage: r.mem_usage,
                    vm_usage: r.vm_usage,
                    io_read: r.io_read,
                    io_write: r.io_write,
                    thread_count: r.thread_count,
                }),
                Ok(Err(e)) if e.is_absent() => break,
                Ok(Err(e)) => {
                    registry(&self.watches).remove(&id);
                    return Err(e);
                }
                Err(e) => {
                    warn!(pid, error = %e, "history sample aborted");
                    break;
                }
            }
        }
        registry(&self.watches).remove(&id);
        if points.is_empty() {
            return Err(ProcError::NotFound(pid));
        }
        Ok(PerformanceHistory { pid, points })
    }

    /// [`collect_history`](Self::collect_history) at the configured history
    /// interval.
    pub async fn history(&self, pid: Pid, duration: Duration) -> Result<PerformanceHistory> {
        self.collect_history(pid, duration, self.config.history_interval())
            .await
    }

    /// Cancel a watch. False if it is unknown or already finished. No callback
    /// for it runs after this returns.
    pub fn stop(&self, id: MonitorId) -> bool {
        let removed = registry(&self.watches).remove(&id);
        match removed {
            Some(watch) => {
                cancel_watch(id, &watch);
                debug!(monitor_id = id, pid = watch.pid, "stopped watch");
                true
            }
            None => false,
        }
    }

    /// Cancel every watch; returns how many were live.
    pub fn stop_all(&self) -> usize {
        let drained: Vec<(MonitorId, Watch)> = registry(&self.watches).drain().collect();
        for (id, watch) in &drained {
            cancel_watch(*id, watch);
        }
        drained.len()
    }

    pub fn is_active(&self, id: MonitorId) -> bool {
        registry(&self.watches).contains_key(&id)
    }

    pub fn active_count(&self) -> usize {
        registry(&self.watches).len()
    }

    pub fn watched_pid(&self, id: MonitorId) -> Option<Pid> {
        registry(&self.watches).get(&id).map(|w| w.pid)
    }

    pub fn watch_kind(&self, id: MonitorId) -> Option<WatchKind> {
        registry(&self.watches).get(&id).map(|w| w.kind)
    }

    /// Last status a status watch observed.
    pub fn last_status(&self, id: MonitorId) -> Option<String> {
        registry(&self.watches)
            .get(&id)
            .and_then(|w| w.last_status.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

impl Drop for ProcessMonitor {
    fn drop(&mut self) {
        let stopped = self.stop_all();
        if stopped > 0 {
            debug!(stopped, "monitor dropped, cancelled watches");
        }
    }
}
