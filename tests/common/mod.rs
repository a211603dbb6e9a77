//! Scriptable in-memory adapter for deterministic component tests.

#![allow(dead_code)]

use procman::error::{ProcError, Result};
use procman::model::{Pid, Priority, PrivilegesInfo, ProcessStatus, Signal};
use procman::platform::{CpuTimes, Identity, PlatformAdapter, ResourceCounters};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FakeProc {
    pub name: String,
    pub ppid: Pid,
    pub status: ProcessStatus,
    pub cpu: CpuTimes,
    pub mem: u64,
    pub priority: Priority,
    pub args: Vec<String>,
}

impl FakeProc {
    pub fn new(name: &str, ppid: Pid) -> Self {
        Self {
            name: name.to_string(),
            ppid,
            status: ProcessStatus::Sleeping,
            cpu: CpuTimes::default(),
            mem: 4096,
            priority: Priority::Normal,
            args: vec![name.to_string()],
        }
    }
}

#[derive(Default)]
pub struct FakeAdapter {
    pub procs: Mutex<HashMap<Pid, FakeProc>>,
    /// pids whose privilege and environment reads are refused
    pub guarded: Mutex<HashSet<Pid>>,
    /// pids whose next identity read races with exit
    pub flaky: Mutex<HashMap<Pid, usize>>,
    /// pids whose next processor-time read races with exit
    pub flaky_cpu: Mutex<HashMap<Pid, usize>>,
    /// privilege lookups served so far
    pub privilege_reads: AtomicUsize,
    pub cores: usize,
}

impl FakeAdapter {
    pub fn new(cores: usize) -> Arc<Self> {
        Arc::new(Self {
            cores,
            ..Default::default()
        })
    }

    pub fn add(&self, pid: Pid, proc_: FakeProc) {
        self.procs.lock().unwrap().insert(pid, proc_);
    }

    pub fn remove(&self, pid: Pid) {
        self.procs.lock().unwrap().remove(&pid);
    }

    pub fn set_status(&self, pid: Pid, status: ProcessStatus) {
        if let Some(p) = self.procs.lock().unwrap().get_mut(&pid) {
            p.status = status;
        }
    }

    pub fn burn(&self, pid: Pid, secs: f64) {
        if let Some(p) = self.procs.lock().unwrap().get_mut(&pid) {
            p.cpu.user += Duration::from_secs_f64(secs);
        }
    }

    pub fn guard(&self, pid: Pid) {
        self.guarded.lock().unwrap().insert(pid);
    }

    pub fn flake(&self, pid: Pid, times: usize) {
        self.flaky.lock().unwrap().insert(pid, times);
    }

    pub fn flake_cpu(&self, pid: Pid, times: usize) {
        self.flaky_cpu.lock().unwrap().insert(pid, times);
    }

    pub fn privilege_reads(&self) -> usize {
        self.privilege_reads.load(Ordering::SeqCst)
    }

    pub fn pids_named(&self, name: &str) -> Vec<Pid> {
        let mut out: Vec<Pid> = self
            .procs
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| p.name == name)
            .map(|(pid, _)| *pid)
            .collect();
        out.sort_unstable();
        out
    }

    fn get(&self, pid: Pid) -> Result<FakeProc> {
        self.procs
            .lock()
            .unwrap()
            .get(&pid)
            .cloned()
            .ok_or(ProcError::NotFound(pid))
    }

    fn check_guard(&self, pid: Pid, op: &'static str) -> Result<()> {
        self.get(pid)?;
        if self.guarded.lock().unwrap().contains(&pid) {
            return Err(ProcError::PermissionDenied { pid, operation: op });
        }
        Ok(())
    }
}

impl PlatformAdapter for FakeAdapter {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn enumerate(&self) -> Vec<(Pid, String)> {
        let mut out: Vec<_> = self
            .procs
            .lock()
            .unwrap()
            .iter()
            .map(|(pid, p)| (*pid, p.name.clone()))
            .collect();
        out.sort();
        out
    }

    fn identity(&self, pid: Pid) -> Result<Identity> {
        {
            let mut flaky = self.flaky.lock().unwrap();
            if let Some(left) = flaky.get_mut(&pid) {
                if *left > 0 {
                    *left -= 1;
                    return Err(ProcError::TransientRead(pid));
                }
            }
        }
        let p = self.get(pid)?;
        Ok(Identity {
            name: p.name.clone(),
            path: format!("/usr/bin/{}", p.name),
            status: p.status,
            ppid: p.ppid,
            start_time: None,
            is_background: p.ppid <= 1,
        })
    }

    fn resources(&self, pid: Pid) -> Result<ResourceCounters> {
        let p = self.get(pid)?;
        Ok(ResourceCounters {
            mem_usage: p.mem,
            vm_usage: p.mem * 4,
            thread_count: 1,
            ..Default::default()
        })
    }

    fn cpu_times(&self, pid: Pid) -> Result<CpuTimes> {
        {
            let mut flaky = self.flaky_cpu.lock().unwrap();
            if let Some(left) = flaky.get_mut(&pid) {
                if *left > 0 {
                    *left -= 1;
                    return Err(ProcError::TransientRead(pid));
                }
            }
        }
        self.get(pid).map(|p| p.cpu)
    }

    fn processor_count(&self) -> usize {
        self.cores
    }

    fn priority(&self, pid: Pid) -> Result<Priority> {
        self.get(pid).map(|p| p.priority)
    }

    fn set_priority(&self, pid: Pid, priority: Priority) -> Result<()> {
        self.check_guard(pid, "set priority")?;
        if let Some(p) = self.procs.lock().unwrap().get_mut(&pid) {
            p.priority = priority;
        }
        Ok(())
    }

    fn signal(&self, pid: Pid, signal: Signal) -> Result<()> {
        self.check_guard(pid, "signal")?;
        if signal.is_terminating() {
            self.remove(pid);
        }
        Ok(())
    }

    fn children(&self, pid: Pid) -> Vec<Pid> {
        let mut out: Vec<Pid> = self
            .procs
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| p.ppid == pid)
            .map(|(child, _)| *child)
            .collect();
        out.sort_unstable();
        out
    }

    fn command_line(&self, pid: Pid) -> Result<Vec<String>> {
        self.get(pid).map(|p| p.args)
    }

    fn environment(&self, pid: Pid) -> Result<HashMap<String, String>> {
        self.check_guard(pid, "read environment")?;
        Ok(HashMap::from([("HOME".to_string(), "/root".to_string())]))
    }

    fn privileges(&self, pid: Pid) -> Result<PrivilegesInfo> {
        self.privilege_reads.fetch_add(1, Ordering::SeqCst);
        self.check_guard(pid, "read status")?;
        Ok(PrivilegesInfo {
            username: "tester".into(),
            uid: Some(1000),
            ..Default::default()
        })
    }

    fn suspend(&self, pid: Pid) -> Result<()> {
        self.check_guard(pid, "suspend")?;
        self.set_status(pid, ProcessStatus::Stopped);
        Ok(())
    }

    fn resume(&self, pid: Pid) -> Result<()> {
        self.check_guard(pid, "resume")?;
        self.set_status(pid, ProcessStatus::Sleeping);
        Ok(())
    }
}

pub fn as_adapter(fake: &Arc<FakeAdapter>) -> Arc<dyn PlatformAdapter> {
    fake.clone()
}
