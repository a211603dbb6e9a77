//! Process records and the small value types shared by every component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

/// Process identifier. Only unique among live processes at a given instant.
pub type Pid = u32;

/// Normalized scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Running,
    Sleeping,
    DiskSleep,
    Stopped,
    Tracing,
    Zombie,
    Dead,
    Idle,
    #[default]
    Unknown,
}

impl ProcessStatus {
    /// Map the one-letter state used by `/proc/<pid>/stat` and `ps`.
    pub fn from_state_char(c: char) -> Self {
        match c {
            'R' => ProcessStatus::Running,
            'S' => ProcessStatus::Sleeping,
            'D' => ProcessStatus::DiskSleep,
            'T' => ProcessStatus::Stopped,
            't' => ProcessStatus::Tracing,
            'Z' => ProcessStatus::Zombie,
            'X' | 'x' => ProcessStatus::Dead,
            'I' => ProcessStatus::Idle,
            // W (paging/waking), K (wakekill), P (parked) are transient sleeps
            'W' | 'K' | 'P' => ProcessStatus::Sleeping,
            _ => ProcessStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Running => "running",
            ProcessStatus::Sleeping => "sleeping",
            ProcessStatus::DiskSleep => "disk-sleep",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Tracing => "tracing",
            ProcessStatus::Zombie => "zombie",
            ProcessStatus::Dead => "dead",
            ProcessStatus::Idle => "idle",
            ProcessStatus::Unknown => "unknown",
        }
    }

    /// Still scheduled (not exited, not a zombie awaiting reaping).
    pub fn is_alive(&self) -> bool {
        !matches!(self, ProcessStatus::Zombie | ProcessStatus::Dead)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling class. A hint to the OS, not an ordering guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Idle,
    Low,
    #[default]
    Normal,
    High,
    Realtime,
}

impl Priority {
    /// Nice value applied on POSIX hosts.
    pub fn to_nice(self) -> i32 {
        match self {
            Priority::Idle => 19,
            Priority::Low => 10,
            Priority::Normal => 0,
            Priority::High => -10,
            Priority::Realtime => -20,
        }
    }

    pub fn from_nice(nice: i32) -> Self {
        match nice {
            n if n >= 10 => Priority::Idle,
            n if n >= 1 => Priority::Low,
            n if n >= -9 => Priority::Normal,
            n if n >= -19 => Priority::High,
            _ => Priority::Realtime,
        }
    }
}

/// Signal number as understood by the host (POSIX numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signal(pub i32);

impl Signal {
    pub const HUP: Signal = Signal(1);
    pub const INT: Signal = Signal(2);
    pub const QUIT: Signal = Signal(3);
    pub const KILL: Signal = Signal(9);
    pub const TERM: Signal = Signal(15);

    #[cfg(unix)]
    pub const STOP: Signal = Signal(libc::SIGSTOP);
    #[cfg(unix)]
    pub const CONT: Signal = Signal(libc::SIGCONT);
    #[cfg(unix)]
    pub const USR1: Signal = Signal(libc::SIGUSR1);
    #[cfg(unix)]
    pub const USR2: Signal = Signal(libc::SIGUSR2);

    #[cfg(not(unix))]
    pub const STOP: Signal = Signal(19);
    #[cfg(not(unix))]
    pub const CONT: Signal = Signal(18);
    #[cfg(not(unix))]
    pub const USR1: Signal = Signal(10);
    #[cfg(not(unix))]
    pub const USR2: Signal = Signal(12);

    pub fn raw(self) -> i32 {
        self.0
    }

    /// Signals that end the target rather than notify it.
    pub fn is_terminating(self) -> bool {
        matches!(self, Signal::INT | Signal::QUIT | Signal::KILL | Signal::TERM)
    }
}

impl Default for Signal {
    fn default() -> Self {
        Signal::TERM
    }
}

impl From<i32> for Signal {
    fn from(raw: i32) -> Self {
        Signal(raw)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessResource {
    /// Percentage from delta sampling, see [`crate::cpu::CpuUsageTracker`]
    pub cpu_usage: f64,
    /// Resident set size in bytes
    pub mem_usage: u64,
    /// Virtual size in bytes
    pub vm_usage: u64,
    pub io_read: u64,
    pub io_write: u64,
    pub thread_count: u32,
    pub open_files: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegesInfo {
    pub username: String,
    pub groupname: String,
    pub uid: Option<u32>,
    pub euid: Option<u32>,
    pub groups: Vec<String>,
    /// Capability or privilege names held by the process
    pub privileges: Vec<String>,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    File,
    Directory,
    Socket,
    Pipe,
    Device,
    AnonInode,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub fd: i32,
    pub path: String,
    pub kind: DescriptorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Tcp,
    Udp,
}

/// One socket held open by a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConnection {
    pub protocol: Transport,
    pub local: SocketAddr,
    pub remote: SocketAddr,
    /// Kernel socket state, e.g. `LISTEN`
    pub state: String,
}

/// Point-in-time snapshot of one process, produced by the inspector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Process {
    pub pid: Pid,
    pub ppid: Pid,
    pub name: String,
    pub path: String,
    pub command: String,
    pub status: ProcessStatus,
    pub username: String,
    pub priority: Priority,
    pub start_time: Option<DateTime<Utc>>,
    pub resources: ProcessResource,
    pub environment: HashMap<String, String>,
    pub is_background: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privileges: Option<PrivilegesInfo>,
}

impl Process {
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            ..Default::default()
        }
    }
}
