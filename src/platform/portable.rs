//! Portable adapter over a `sysinfo` process table (macOS, Windows, BSDs).
//!
//! `sysinfo` answers the read-side queries; mutation and raw processor time go
//! through the host module selected below.

#[cfg(not(windows))]
use super::parse_environment;
use super::{CpuTimes, Identity, PlatformAdapter, ResourceCounters};
use crate::error::{ProcError, Result};
use crate::model::{Pid, Priority, PrivilegesInfo, ProcessStatus, Signal};
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use sysinfo::{CpuRefreshKind, Pid as SysPid, RefreshKind, System, Users};

#[cfg(target_os = "macos")]
use super::macos as host;
#[cfg(all(unix, not(target_os = "macos")))]
use super::unix::generic as host;
#[cfg(windows)]
use super::windows as host;

fn map_status(status: sysinfo::ProcessStatus) -> ProcessStatus {
    use sysinfo::ProcessStatus as S;
    match status {
        S::Run => ProcessStatus::Running,
        S::Sleep | S::Waking | S::Wakekill | S::Parked | S::LockBlocked => ProcessStatus::Sleeping,
        S::UninterruptibleDiskSleep => ProcessStatus::DiskSleep,
        S::Stop => ProcessStatus::Stopped,
        S::Tracing => ProcessStatus::Tracing,
        S::Zombie => ProcessStatus::Zombie,
        S::Dead => ProcessStatus::Dead,
        S::Idle => ProcessStatus::Idle,
        S::Unknown(_) => ProcessStatus::Unknown,
    }
}

pub struct SysinfoAdapter {
    sys: Mutex<System>,
    users: Mutex<Users>,
    cpus: usize,
}

impl Default for SysinfoAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoAdapter {
    pub fn new() -> Self {
        let cpus = System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::new()))
            .cpus()
            .len()
            .max(1);
        Self {
            sys: Mutex::new(System::new()),
            users: Mutex::new(Users::new_with_refreshed_list()),
            cpus,
        }
    }

    /// Refresh one process and project it; `NotFound` if it is gone.
    fn with_process<T>(&self, pid: Pid, f: impl FnOnce(&sysinfo::Process) -> T) -> Result<T> {
        let mut sys = self.sys.lock().unwrap_or_else(PoisonError::into_inner);
        let key = SysPid::from_u32(pid);
        if pid == 0 || !sys.refresh_process(key) {
            return Err(ProcError::NotFound(pid));
        }
        sys.process(key).map(f).ok_or(ProcError::NotFound(pid))
    }

    fn with_table<T>(&self, f: impl FnOnce(&System) -> T) -> T {
        let mut sys = self.sys.lock().unwrap_or_else(PoisonError::into_inner);
        sys.refresh_processes();
        f(&sys)
    }
}

impl PlatformAdapter for SysinfoAdapter {
    fn name(&self) -> &'static str {
        "sysinfo"
    }

    fn enumerate(&self) -> Vec<(Pid, String)> {
        let mut out: Vec<(Pid, String)> = self.with_table(|sys| {
            sys.processes()
                .iter()
                .map(|(pid, p)| (pid.as_u32(), p.name().to_string()))
                .collect()
        });
        out.sort_by_key(|(pid, _)| *pid);
        out
    }

    fn identity(&self, pid: Pid) -> Result<Identity> {
        self.with_process(pid, |p| {
            let ppid = p.parent().map(|pp| pp.as_u32()).unwrap_or(0);
            Identity {
                name: p.name().to_string(),
                path: p
                    .exe()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                status: map_status(p.status()),
                ppid,
                start_time: Utc.timestamp_opt(p.start_time() as i64, 0).single(),
                // reparented to init/launchd: no longer attached to a session leader
                is_background: ppid <= 1,
            }
        })
    }

    fn resources(&self, pid: Pid) -> Result<ResourceCounters> {
        self.with_process(pid, |p| {
            let disk = p.disk_usage();
            ResourceCounters {
                mem_usage: p.memory(),
                vm_usage: p.virtual_memory(),
                io_read: disk.total_read_bytes,
                io_write: disk.total_written_bytes,
                thread_count: p.tasks().map(|t| t.len() as u32).unwrap_or(0),
                open_files: 0,
            }
        })
    }

    fn cpu_times(&self, pid: Pid) -> Result<CpuTimes> {
        host::cpu_times(pid)
    }

    fn processor_count(&self) -> usize {
        self.cpus
    }

    fn priority(&self, pid: Pid) -> Result<Priority> {
        host::priority(pid)
    }

    fn set_priority(&self, pid: Pid, priority: Priority) -> Result<()> {
        host::set_priority(pid, priority)
    }

    fn signal(&self, pid: Pid, signal: Signal) -> Result<()> {
        host::signal(pid, signal)
    }

    fn children(&self, pid: Pid) -> Vec<Pid> {
        let mut out: Vec<Pid> = self.with_table(|sys| {
            sys.processes()
                .iter()
                .filter(|(_, p)| p.parent().map(|pp| pp.as_u32()) == Some(pid))
                .map(|(child, _)| child.as_u32())
                .collect()
        });
        out.sort_unstable();
        out
    }

    fn command_line(&self, pid: Pid) -> Result<Vec<String>> {
        self.with_process(pid, |p| p.cmd().to_vec())
    }

    #[cfg(not(windows))]
    fn environment(&self, pid: Pid) -> Result<HashMap<String, String>> {
        self.with_process(pid, |p| parse_environment(p.environ().iter().map(String::as_str)))
    }

    #[cfg(windows)]
    fn environment(&self, pid: Pid) -> Result<HashMap<String, String>> {
        if pid == std::process::id() {
            return Ok(std::env::vars().collect());
        }
        self.with_process(pid, |_| ())?;
        Err(ProcError::PlatformUnsupported("reading another process's environment"))
    }

    fn privileges(&self, pid: Pid) -> Result<PrivilegesInfo> {
        let uid = self.with_process(pid, |p| p.user_id().cloned())?;
        let Some(uid) = uid else {
            return Err(ProcError::denied(pid, "read owner"));
        };
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        let user = users.get_user_by_id(&uid);
        let groups: Vec<String> = user
            .map(|u| u.groups().iter().map(|g| g.name().to_string()).collect())
            .unwrap_or_default();
        #[cfg(unix)]
        let numeric_uid: Option<u32> = Some(*uid);
        #[cfg(not(unix))]
        let numeric_uid: Option<u32> = None;
        let is_admin = match numeric_uid {
            Some(id) => id == 0,
            None => groups.iter().any(|g| g == "Administrators"),
        };
        Ok(PrivilegesInfo {
            username: user.map(|u| u.name().to_string()).unwrap_or_default(),
            groupname: groups.first().cloned().unwrap_or_default(),
            uid: numeric_uid,
            euid: None,
            groups,
            privileges: Vec::new(),
            is_admin,
        })
    }

    fn suspend(&self, pid: Pid) -> Result<()> {
        host::suspend(pid)
    }

    fn resume(&self, pid: Pid) -> Result<()> {
        host::resume(pid)
    }

    fn affinity(&self, pid: Pid) -> Result<Vec<usize>> {
        host::affinity(pid)
    }

    fn set_affinity(&self, pid: Pid, cores: &[usize]) -> Result<()> {
        host::set_affinity(pid, cores)
    }

    fn set_memory_limit(&self, pid: Pid, bytes: u64) -> Result<()> {
        host::set_memory_limit(pid, bytes)
    }

    fn modules(&self, pid: Pid) -> Result<Vec<String>> {
        host::modules(pid)
    }

    fn windows_privileges(&self, pid: Pid) -> Result<Vec<String>> {
        host::windows_privileges(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sysinfo_sees_current_process() {
        let adapter = SysinfoAdapter::new();
        let me = std::process::id();
        let id = adapter.identity(me).unwrap();
        assert!(!id.name.is_empty());
        assert!(adapter.resources(me).unwrap().mem_usage > 0);
        assert!(!adapter.command_line(me).unwrap().is_empty());
    }

    #[test]
    fn sysinfo_missing_pid() {
        let adapter = SysinfoAdapter::new();
        assert!(matches!(adapter.identity(0), Err(ProcError::NotFound(0))));
        assert!(matches!(
            adapter.resources(u32::MAX - 1),
            Err(ProcError::NotFound(_))
        ));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(map_status(sysinfo::ProcessStatus::Run), ProcessStatus::Running);
        assert_eq!(map_status(sysinfo::ProcessStatus::Zombie), ProcessStatus::Zombie);
        assert_eq!(map_status(sysinfo::ProcessStatus::Unknown(9)), ProcessStatus::Unknown);
    }
}
