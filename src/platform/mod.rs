//! Platform adapters: one implementation per native instrumentation model,
//! all satisfying [`PlatformAdapter`] with the same success/failure taxonomy.
//!
//! - Linux: [`ProcfsAdapter`] parses `/proc` text files.
//! - Everything else: [`SysinfoAdapter`] over a `sysinfo` process table, with
//!   native hooks for the operations `sysinfo` does not cover.

use crate::error::{ProcError, Result};
use crate::model::{
    FileDescriptor, NetworkConnection, Pid, Priority, PrivilegesInfo, ProcessStatus, Signal,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
mod portable;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(target_os = "linux")]
pub use linux::ProcfsAdapter;
pub use portable::SysinfoAdapter;

/// Identity fields that every platform can resolve for a live process.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub name: String,
    pub path: String,
    pub status: ProcessStatus,
    pub ppid: Pid,
    pub start_time: Option<DateTime<Utc>>,
    pub is_background: bool,
}

/// Raw resource counters. CPU usage is derived separately by delta sampling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceCounters {
    pub mem_usage: u64,
    pub vm_usage: u64,
    pub io_read: u64,
    pub io_write: u64,
    pub thread_count: u32,
    pub open_files: u32,
}

/// Processor time consumed by a process since it started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: Duration,
    pub system: Duration,
}

impl CpuTimes {
    pub fn total(&self) -> Duration {
        self.user + self.system
    }
}

/// Primitive per-process queries and mutations for one host OS family.
///
/// `NotFound` means the process did not exist at query time; `PermissionDenied`
/// means it exists but introspection or control was refused. Operations with
/// no native equivalent return `PlatformUnsupported`.
pub trait PlatformAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// All live processes. Never fails; empty on total failure.
    fn enumerate(&self) -> Vec<(Pid, String)>;

    fn identity(&self, pid: Pid) -> Result<Identity>;

    fn resources(&self, pid: Pid) -> Result<ResourceCounters>;

    fn cpu_times(&self, pid: Pid) -> Result<CpuTimes>;

    /// Logical processors available to the host.
    fn processor_count(&self) -> usize;

    fn priority(&self, pid: Pid) -> Result<Priority>;

    fn set_priority(&self, pid: Pid, priority: Priority) -> Result<()>;

    fn signal(&self, pid: Pid, signal: Signal) -> Result<()>;

    fn children(&self, pid: Pid) -> Vec<Pid>;

    /// Argument vector; empty if the platform hides it.
    fn command_line(&self, pid: Pid) -> Result<Vec<String>>;

    fn environment(&self, pid: Pid) -> Result<HashMap<String, String>>;

    fn privileges(&self, pid: Pid) -> Result<PrivilegesInfo>;

    fn suspend(&self, pid: Pid) -> Result<()>;

    fn resume(&self, pid: Pid) -> Result<()>;

    fn affinity(&self, _pid: Pid) -> Result<Vec<usize>> {
        Err(ProcError::PlatformUnsupported("process affinity"))
    }

    fn set_affinity(&self, _pid: Pid, _cores: &[usize]) -> Result<()> {
        Err(ProcError::PlatformUnsupported("process affinity"))
    }

    fn set_memory_limit(&self, _pid: Pid, _bytes: u64) -> Result<()> {
        Err(ProcError::PlatformUnsupported("memory limit"))
    }

    /// Effective Linux capabilities.
    fn capabilities(&self, _pid: Pid) -> Result<Vec<String>> {
        Err(ProcError::PlatformUnsupported("capabilities"))
    }

    /// Shared objects / DLLs mapped into the process.
    fn modules(&self, _pid: Pid) -> Result<Vec<String>> {
        Err(ProcError::PlatformUnsupported("module listing"))
    }

    /// Token privileges (Windows only).
    fn windows_privileges(&self, _pid: Pid) -> Result<Vec<String>> {
        Err(ProcError::PlatformUnsupported("windows privileges"))
    }

    fn file_descriptors(&self, _pid: Pid) -> Result<Vec<FileDescriptor>> {
        Err(ProcError::PlatformUnsupported("file descriptor listing"))
    }

    /// Best-effort I/O scheduling level, 0 (highest) to [`IO_PRIORITY_MAX`].
    fn io_priority(&self, _pid: Pid) -> Result<u8> {
        Err(ProcError::PlatformUnsupported("io priority"))
    }

    fn set_io_priority(&self, _pid: Pid, _level: u8) -> Result<()> {
        Err(ProcError::PlatformUnsupported("io priority"))
    }

    /// Sockets the process holds open.
    fn network_connections(&self, _pid: Pid) -> Result<Vec<NetworkConnection>> {
        Err(ProcError::PlatformUnsupported("network connection listing"))
    }
}

/// Lowest best-effort I/O priority level.
pub const IO_PRIORITY_MAX: u8 = 7;

/// Uid and primary gid of the account `name`.
#[cfg(unix)]
pub(crate) fn user_ids(name: &str) -> Result<(u32, u32)> {
    unix::user_ids(name)
}

/// Adapter for the host OS, selected once.
pub fn native() -> Arc<dyn PlatformAdapter> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(ProcfsAdapter::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Arc::new(SysinfoAdapter::new())
    }
}

/// Split `KEY=VALUE` entries; entries without `=` are dropped.
pub(crate) fn parse_environment<'a>(
    entries: impl IntoIterator<Item = &'a str>,
) -> HashMap<String, String> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
