//! Bounded registry of processes this toolkit created.
//!
//! The manager is the only long-lived owner of native child handles. A record
//! lives from `create` until `terminate`; its handle is released exactly once,
//! either when the child is reaped or when the manager is dropped.

use crate::config::ManagerConfig;
use crate::controller::{ControlState, ProcessController, SpawnOptions};
use crate::error::{ProcError, Result};
use crate::model::{Pid, Signal};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, ExitStatus};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const REAP_POLL: Duration = Duration::from_millis(20);
/// How long output readers get to hit EOF after the child itself exited.
const READER_DRAIN: Duration = Duration::from_millis(250);

type OutputBuffer = Arc<Mutex<Vec<String>>>;

/// Selects a managed process for termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessTarget {
    Pid(Pid),
    Identifier(String),
}

impl From<Pid> for ProcessTarget {
    fn from(pid: Pid) -> Self {
        ProcessTarget::Pid(pid)
    }
}

impl From<&str> for ProcessTarget {
    fn from(identifier: &str) -> Self {
        ProcessTarget::Identifier(identifier.to_string())
    }
}

impl From<String> for ProcessTarget {
    fn from(identifier: String) -> Self {
        ProcessTarget::Identifier(identifier)
    }
}

/// Snapshot of one managed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedProcess {
    pub pid: Pid,
    pub identifier: String,
    pub command: String,
    pub background: bool,
    pub state: ControlState,
    /// Exit code once reaped; `None` while running or when killed by a signal
    pub exit_code: Option<i32>,
}

struct Record {
    pid: Pid,
    identifier: String,
    command: String,
    background: bool,
    child: Mutex<Option<Child>>,
    output: OutputBuffer,
    readers: Mutex<Vec<JoinHandle<()>>>,
    state: Mutex<ControlState>,
    exit: Mutex<Option<ExitStatus>>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Record {
    fn snapshot(&self) -> ManagedProcess {
        ManagedProcess {
            pid: self.pid,
            identifier: self.identifier.clone(),
            command: self.command.clone(),
            background: self.background,
            state: *lock(&self.state),
            exit_code: lock(&self.exit).and_then(|s| s.code()),
        }
    }

    fn set_state(&self, next: ControlState) {
        let mut state = lock(&self.state);
        match state.transition(next) {
            Ok(s) => *state = s,
            Err(e) => debug!(pid = self.pid, error = %e, "ignoring state change"),
        }
    }

    fn finish(&self, status: Option<ExitStatus>) {
        if status.is_some() {
            *lock(&self.exit) = status;
        }
        self.set_state(ControlState::Terminated);
    }

    /// Non-blocking reap. True once the child has exited and its handle is released.
    fn poll_exit(&self) -> bool {
        let mut guard = lock(&self.child);
        let Some(child) = guard.as_mut() else {
            return true;
        };
        match child.try_wait() {
            Ok(None) => false,
            Ok(Some(status)) => {
                *guard = None;
                drop(guard);
                debug!(pid = self.pid, identifier = %self.identifier, ?status, "managed process exited");
                self.finish(Some(status));
                true
            }
            Err(e) => {
                warn!(pid = self.pid, error = %e, "lost track of managed process");
                *guard = None;
                drop(guard);
                self.finish(None);
                true
            }
        }
    }

    /// Join readers that reach EOF within `READER_DRAIN`. A pipe inherited by
    /// a grandchild stays open after the child exits; such readers are
    /// detached and keep appending to the buffer until the pipe closes.
    fn join_readers(&self) {
        let mut pending: Vec<JoinHandle<()>> = lock(&self.readers).drain(..).collect();
        let deadline = Instant::now() + READER_DRAIN;
        loop {
            let (finished, running): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|r| r.is_finished());
            for reader in finished {
                if reader.join().is_err() {
                    warn!(pid = self.pid, "output reader panicked");
                }
            }
            pending = running;
            if pending.is_empty() {
                return;
            }
            if Instant::now() >= deadline {
                debug!(
                    pid = self.pid,
                    identifier = %self.identifier,
                    readers = pending.len(),
                    "output still open after exit, detaching readers"
                );
                return;
            }
            std::thread::sleep(REAP_POLL);
        }
    }

    /// Signal, give the child `grace` to exit, then kill and reap it.
    fn release(&self, controller: &ProcessController, signal: Signal, grace: Duration) {
        if self.poll_exit() {
            return;
        }
        if let Err(e) = controller.send_signal(self.pid, signal) {
            warn!(pid = self.pid, %signal, error = %e, "signal refused, killing instead");
        }
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if self.poll_exit() {
                return;
            }
            std::thread::sleep(REAP_POLL);
        }
        let mut guard = lock(&self.child);
        if let Some(mut child) = guard.take() {
            drop(guard);
            if let Err(e) = child.kill() {
                debug!(pid = self.pid, error = %e, "kill after grace period failed");
            }
            let status = child.wait().ok();
            info!(pid = self.pid, identifier = %self.identifier, "killed managed process after grace period");
            self.finish(status);
        }
    }
}

fn spawn_reader(stream: impl Read + Send + 'static, output: OutputBuffer) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for line in BufReader::new(stream).lines().map_while(std::io::Result::ok) {
            lock(&output).push(line);
        }
    })
}

pub struct ProcessManager {
    controller: Arc<ProcessController>,
    config: ManagerConfig,
    records: RwLock<HashMap<String, Arc<Record>>>,
}

impl ProcessManager {
    pub fn new(controller: Arc<ProcessController>, config: ManagerConfig) -> Self {
        Self {
            controller,
            config,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.config.max_processes
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn `command` under `identifier`. Fails with `ResourceExhausted` at
    /// capacity; existing records are never evicted.
    pub fn create(&self, command: &str, identifier: &str, background: bool) -> Result<Pid> {
        if identifier.is_empty() {
            return Err(ProcError::InvalidArgument("empty identifier".into()));
        }
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(identifier) {
            return Err(ProcError::InvalidArgument(format!(
                "identifier '{identifier}' is already managed"
            )));
        }
        if records.len() >= self.config.max_processes {
            warn!(identifier, limit = self.config.max_processes, "process limit reached");
            return Err(ProcError::ResourceExhausted {
                limit: self.config.max_processes,
            });
        }

        let options = SpawnOptions {
            background,
            capture_output: true,
            shell: self.config.shell.clone(),
            user: None,
        };
        let mut spawned = self.controller.spawn(command, &options)?;
        let output: OutputBuffer = Arc::new(Mutex::new(Vec::new()));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = spawned.child.stdout.take() {
            readers.push(spawn_reader(stdout, Arc::clone(&output)));
        }
        if let Some(stderr) = spawned.child.stderr.take() {
            readers.push(spawn_reader(stderr, Arc::clone(&output)));
        }

        let pid = spawned.pid;
        let record = Record {
            pid,
            identifier: identifier.to_string(),
            command: command.to_string(),
            background,
            child: Mutex::new(Some(spawned.child)),
            output,
            readers: Mutex::new(readers),
            state: Mutex::new(ControlState::Spawned),
            exit: Mutex::new(None),
        };
        record.set_state(ControlState::Running);
        records.insert(identifier.to_string(), Arc::new(record));
        info!(pid, identifier, background, "managing process");
        Ok(pid)
    }

    /// Run a shell script body under `identifier`.
    pub fn run_script(&self, script: &str, identifier: &str, background: bool) -> Result<Pid> {
        self.create(script, identifier, background)
    }

    pub fn has_process(&self, identifier: &str) -> bool {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(identifier)
    }

    pub fn managed(&self, identifier: &str) -> Option<ManagedProcess> {
        self.record(identifier).map(|r| r.snapshot())
    }

    /// Remove the record, stop the process if it still runs, and release its
    /// handle. `Ok(false)` when no managed process matches.
    pub fn terminate(&self, target: impl Into<ProcessTarget>, signal: Signal) -> Result<bool> {
        let target = target.into();
        let record = {
            let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
            let key = match &target {
                ProcessTarget::Identifier(id) => records.contains_key(id).then(|| id.clone()),
                ProcessTarget::Pid(pid) => records
                    .iter()
                    .find(|(_, r)| r.pid == *pid)
                    .map(|(id, _)| id.clone()),
            };
            match key.and_then(|k| records.remove(&k)) {
                Some(r) => r,
                None => return Ok(false),
            }
        };
        record.release(&self.controller, signal, self.config.terminate_grace());
        // readers of a killed shell may be kept open by orphaned grandchildren
        lock(&record.readers).clear();
        info!(pid = record.pid, identifier = %record.identifier, "released managed process");
        Ok(true)
    }

    /// Block until every managed process has exited and its output is drained.
    /// Output still held open by a surviving grandchild is not waited for.
    /// Records stay registered until `terminate`.
    pub fn wait_for_completion(&self) {
        for record in self.snapshot_records() {
            while !record.poll_exit() {
                std::thread::sleep(REAP_POLL);
            }
            record.join_readers();
        }
    }

    /// Captured stdout and stderr lines; empty for unknown identifiers.
    pub fn get_process_output(&self, identifier: &str) -> Vec<String> {
        self.record(identifier)
            .map(|r| lock(&r.output).clone())
            .unwrap_or_default()
    }

    /// Observe exits. Returns identifiers that finished since the last call.
    pub fn refresh(&self) -> Vec<String> {
        self.snapshot_records()
            .into_iter()
            .filter(|r| {
                let finished = lock(&r.state).is_terminal();
                !finished && r.poll_exit()
            })
            .map(|r| r.identifier.clone())
            .collect()
    }

    pub fn running_processes(&self) -> Vec<ManagedProcess> {
        self.refresh();
        let mut out: Vec<ManagedProcess> = self
            .snapshot_records()
            .iter()
            .map(|r| r.snapshot())
            .filter(|p| !p.state.is_terminal())
            .collect();
        out.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        out
    }

    pub fn suspend(&self, identifier: &str) -> Result<bool> {
        self.control(identifier, ControlState::Suspended, |c, pid| c.suspend(pid))
    }

    pub fn resume(&self, identifier: &str) -> Result<bool> {
        self.control(identifier, ControlState::Running, |c, pid| c.resume(pid))
    }

    fn control(
        &self,
        identifier: &str,
        next: ControlState,
        op: impl FnOnce(&ProcessController, Pid) -> Result<bool>,
    ) -> Result<bool> {
        let Some(record) = self.record(identifier) else {
            return Ok(false);
        };
        lock(&record.state).transition(next)?;
        let done = op(&self.controller, record.pid)?;
        if done {
            record.set_state(next);
        }
        Ok(done)
    }

    fn record(&self, identifier: &str) -> Option<Arc<Record>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identifier)
            .cloned()
    }

    fn snapshot_records(&self) -> Vec<Arc<Record>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl Drop for ProcessManager {
    fn drop(&mut self) {
        let records = self.records.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (identifier, record) in records.drain() {
            let mut guard = lock(&record.child);
            let Some(mut child) = guard.take() else {
                continue;
            };
            if record.background {
                // detached work outlives the manager; reap only if already done
                let _ = child.try_wait();
                debug!(pid = record.pid, identifier = %identifier, "leaving background process running");
            } else {
                let _ = child.kill();
                let _ = child.wait();
                debug!(pid = record.pid, identifier = %identifier, "killed foreground process on drop");
            }
        }
    }
}
