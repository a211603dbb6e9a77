//! Linux adapter: parses `/proc/<pid>/*` text files, `libc` for mutation.

#![allow(unsafe_code)]

use super::{
    parse_environment, unix, CpuTimes, Identity, PlatformAdapter, ResourceCounters,
    IO_PRIORITY_MAX,
};
use crate::error::{ProcError, Result};
use crate::model::{
    DescriptorKind, FileDescriptor, NetworkConnection, Pid, Priority, PrivilegesInfo,
    ProcessStatus, Signal, Transport,
};
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Fields of `/proc/<pid>/stat` this adapter consumes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StatLine {
    pub comm: String,
    pub state: char,
    pub ppid: Pid,
    pub pgrp: i32,
    pub tty_nr: i32,
    pub tpgid: i32,
    pub utime: u64,
    pub stime: u64,
    pub nice: i32,
    pub num_threads: u32,
    pub starttime: u64,
    pub vsize: u64,
    pub rss: i64,
}

impl StatLine {
    /// No controlling terminal, or not in the terminal's foreground group.
    pub fn is_background(&self) -> bool {
        self.tty_nr == 0 || self.tpgid != self.pgrp
    }
}

/// Parse a stat line. The command name may itself contain spaces and
/// parentheses, so fields are located relative to the last `)`.
pub(crate) fn parse_stat(content: &str) -> Option<StatLine> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    if close < open {
        return None;
    }
    let comm = content[open + 1..close].to_string();
    let rest: Vec<&str> = content[close + 1..].split_whitespace().collect();
    // rest[0] is field 3 (state); field n lives at rest[n - 3]
    if rest.len() < 22 {
        return None;
    }
    Some(StatLine {
        comm,
        state: rest[0].chars().next()?,
        ppid: rest[1].parse().ok()?,
        pgrp: rest[2].parse().ok()?,
        tty_nr: rest[4].parse().ok()?,
        tpgid: rest[5].parse().ok()?,
        utime: rest[11].parse().ok()?,
        stime: rest[12].parse().ok()?,
        nice: rest[16].parse().ok()?,
        num_threads: rest[17].parse().ok()?,
        starttime: rest[19].parse().ok()?,
        vsize: rest[20].parse().ok()?,
        rss: rest[21].parse().ok()?,
    })
}

/// `read_bytes` / `write_bytes` from `/proc/<pid>/io`.
pub(crate) fn parse_io(content: &str) -> (u64, u64) {
    let mut read = 0;
    let mut write = 0;
    for line in content.lines() {
        if let Some(v) = line.strip_prefix("read_bytes:") {
            read = v.trim().parse().unwrap_or(0);
        } else if let Some(v) = line.strip_prefix("write_bytes:") {
            write = v.trim().parse().unwrap_or(0);
        }
    }
    (read, write)
}

#[derive(Debug, Default, PartialEq)]
pub(crate) struct StatusFile {
    pub uid: Option<u32>,
    pub euid: Option<u32>,
    pub gid: Option<u32>,
    pub groups: Vec<u32>,
    pub cap_eff: u64,
}

pub(crate) fn parse_status(content: &str) -> StatusFile {
    let mut out = StatusFile::default();
    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let mut ids = value.split_whitespace().filter_map(|v| v.parse::<u32>().ok());
        match key {
            "Uid" => {
                out.uid = ids.next();
                out.euid = ids.next();
            }
            "Gid" => out.gid = ids.next(),
            "Groups" => out.groups = ids.collect(),
            "CapEff" => out.cap_eff = u64::from_str_radix(value.trim(), 16).unwrap_or(0),
            _ => {}
        }
    }
    out
}

const CAPABILITY_NAMES: [&str; 41] = [
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_DAC_READ_SEARCH",
    "CAP_FOWNER",
    "CAP_FSETID",
    "CAP_KILL",
    "CAP_SETGID",
    "CAP_SETUID",
    "CAP_SETPCAP",
    "CAP_LINUX_IMMUTABLE",
    "CAP_NET_BIND_SERVICE",
    "CAP_NET_BROADCAST",
    "CAP_NET_ADMIN",
    "CAP_NET_RAW",
    "CAP_IPC_LOCK",
    "CAP_IPC_OWNER",
    "CAP_SYS_MODULE",
    "CAP_SYS_RAWIO",
    "CAP_SYS_CHROOT",
    "CAP_SYS_PTRACE",
    "CAP_SYS_PACCT",
    "CAP_SYS_ADMIN",
    "CAP_SYS_BOOT",
    "CAP_SYS_NICE",
    "CAP_SYS_RESOURCE",
    "CAP_SYS_TIME",
    "CAP_SYS_TTY_CONFIG",
    "CAP_MKNOD",
    "CAP_LEASE",
    "CAP_AUDIT_WRITE",
    "CAP_AUDIT_CONTROL",
    "CAP_SETFCAP",
    "CAP_MAC_OVERRIDE",
    "CAP_MAC_ADMIN",
    "CAP_SYSLOG",
    "CAP_WAKE_ALARM",
    "CAP_BLOCK_SUSPEND",
    "CAP_AUDIT_READ",
    "CAP_PERFMON",
    "CAP_BPF",
    "CAP_CHECKPOINT_RESTORE",
];

pub(crate) fn decode_capabilities(mask: u64) -> Vec<String> {
    (0..64)
        .filter(|bit| mask & (1u64 << bit) != 0)
        .map(|bit| match CAPABILITY_NAMES.get(bit as usize) {
            Some(name) => name.to_string(),
            None => format!("CAP_{}", bit),
        })
        .collect()
}

/// Distinct shared objects from `/proc/<pid>/maps`, in mapping order.
pub(crate) fn parse_maps(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for line in content.lines() {
        let Some(path) = line.split_whitespace().nth(5) else {
            continue;
        };
        if path.starts_with('/') && (path.ends_with(".so") || path.contains(".so.")) && seen.insert(path) {
            out.push(path.to_string());
        }
    }
    out
}

const IOPRIO_WHO_PROCESS: libc::c_int = 1;
const IOPRIO_CLASS_SHIFT: libc::c_int = 13;
const IOPRIO_CLASS_BE: libc::c_int = 2;

const SOCKET_TABLES: [(&str, Transport); 4] = [
    ("net/tcp", Transport::Tcp),
    ("net/tcp6", Transport::Tcp),
    ("net/udp", Transport::Udp),
    ("net/udp6", Transport::Udp),
];

fn socket_state(code: u8) -> &'static str {
    match code {
        0x01 => "ESTABLISHED",
        0x02 => "SYN_SENT",
        0x03 => "SYN_RECV",
        0x04 => "FIN_WAIT1",
        0x05 => "FIN_WAIT2",
        0x06 => "TIME_WAIT",
        0x07 => "CLOSE",
        0x08 => "CLOSE_WAIT",
        0x09 => "LAST_ACK",
        0x0A => "LISTEN",
        0x0B => "CLOSING",
        0x0C => "NEW_SYN_RECV",
        _ => "UNKNOWN",
    }
}

/// `ADDR:PORT` from a socket table. The address is printed as 32-bit words
/// in host byte order, the port as plain hex.
pub(crate) fn parse_socket_address(field: &str) -> Option<SocketAddr> {
    let (addr, port) = field.split_once(':')?;
    let port = u16::from_str_radix(port, 16).ok()?;
    let ip = match addr.len() {
        8 => IpAddr::V4(Ipv4Addr::from(
            u32::from_str_radix(addr, 16).ok()?.to_ne_bytes(),
        )),
        32 => {
            let mut octets = [0u8; 16];
            for (i, chunk) in octets.chunks_exact_mut(4).enumerate() {
                let word = u32::from_str_radix(addr.get(i * 8..i * 8 + 8)?, 16).ok()?;
                chunk.copy_from_slice(&word.to_ne_bytes());
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };
    Some(SocketAddr::new(ip, port))
}

/// Rows of `/proc/<pid>/net/{tcp,udp}{,6}` keyed by socket inode.
pub(crate) fn parse_socket_table(content: &str, protocol: Transport) -> Vec<(u64, NetworkConnection)> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                return None;
            }
            let state = u8::from_str_radix(fields[3], 16).ok()?;
            let inode = fields[9].parse().ok()?;
            Some((
                inode,
                NetworkConnection {
                    protocol,
                    local: parse_socket_address(fields[1])?,
                    remote: parse_socket_address(fields[2])?,
                    state: socket_state(state).to_string(),
                },
            ))
        })
        .collect()
}

/// Inode of a `socket:[N]` descriptor target.
fn socket_inode(target: &str) -> Option<u64> {
    target.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
}

fn descriptor_kind(target: &str, path: &Path) -> DescriptorKind {
    if target.starts_with("socket:") {
        DescriptorKind::Socket
    } else if target.starts_with("pipe:") {
        DescriptorKind::Pipe
    } else if target.starts_with("anon_inode:") {
        DescriptorKind::AnonInode
    } else if target.starts_with("/dev/") {
        DescriptorKind::Device
    } else if target.starts_with('/') {
        match fs::metadata(path) {
            Ok(m) if m.is_dir() => DescriptorKind::Directory,
            _ => DescriptorKind::File,
        }
    } else {
        DescriptorKind::Other
    }
}

pub struct ProcfsAdapter {
    root: PathBuf,
    page_size: u64,
    clock_ticks: u64,
    boot_time: u64,
    num_cpus: usize,
}

impl Default for ProcfsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcfsAdapter {
    pub fn new() -> Self {
        // SAFETY: sysconf only reads system configuration.
        let (page_size, clock_ticks, num_cpus) = unsafe {
            (
                libc::sysconf(libc::_SC_PAGESIZE),
                libc::sysconf(libc::_SC_CLK_TCK),
                libc::sysconf(libc::_SC_NPROCESSORS_ONLN),
            )
        };
        let root = PathBuf::from("/proc");
        let boot_time = Self::read_boot_time(&root);
        Self {
            root,
            page_size: u64::try_from(page_size).unwrap_or(4096).max(1),
            clock_ticks: u64::try_from(clock_ticks).unwrap_or(100).max(1),
            boot_time,
            num_cpus: usize::try_from(num_cpus).unwrap_or(1).max(1),
        }
    }

    fn read_boot_time(root: &Path) -> u64 {
        let stat = fs::read_to_string(root.join("stat")).unwrap_or_default();
        stat.lines()
            .find_map(|line| line.strip_prefix("btime "))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    fn proc_dir(&self, pid: Pid) -> PathBuf {
        self.root.join(pid.to_string())
    }

    fn exists(&self, pid: Pid) -> bool {
        pid != 0 && self.proc_dir(pid).is_dir()
    }

    fn require(&self, pid: Pid) -> Result<PathBuf> {
        if self.exists(pid) {
            Ok(self.proc_dir(pid))
        } else {
            Err(ProcError::NotFound(pid))
        }
    }

    /// Map a failed procfs read onto the shared taxonomy.
    fn classify(&self, pid: Pid, err: io::Error, operation: &'static str) -> ProcError {
        if err.kind() == io::ErrorKind::PermissionDenied {
            return ProcError::denied(pid, operation);
        }
        if !self.exists(pid) {
            return ProcError::NotFound(pid);
        }
        match err.raw_os_error() {
            Some(libc::ESRCH) | Some(libc::ENOENT) => ProcError::TransientRead(pid),
            _ => ProcError::Io(err),
        }
    }

    fn read(&self, pid: Pid, file: &str, operation: &'static str) -> Result<String> {
        let dir = self.require(pid)?;
        fs::read_to_string(dir.join(file)).map_err(|e| self.classify(pid, e, operation))
    }

    /// Like `read`, but a denied or absent file yields `None` while the process lives.
    fn read_optional(&self, pid: Pid, file: &str) -> Result<Option<String>> {
        match self.read(pid, file, "read") {
            Ok(content) => Ok(Some(content)),
            Err(ProcError::PermissionDenied { .. }) => Ok(None),
            Err(ProcError::TransientRead(_)) if self.exists(pid) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn stat(&self, pid: Pid) -> Result<StatLine> {
        let content = self.read(pid, "stat", "read stat")?;
        parse_stat(&content).ok_or(ProcError::TransientRead(pid))
    }

    fn ticks_to_duration(&self, ticks: u64) -> Duration {
        let secs = ticks / self.clock_ticks;
        let rem = ticks % self.clock_ticks;
        Duration::from_secs(secs) + Duration::from_nanos(rem * 1_000_000_000 / self.clock_ticks)
    }

    fn count_fds(&self, pid: Pid) -> Result<u32> {
        let dir = self.require(pid)?;
        match fs::read_dir(dir.join("fd")) {
            Ok(entries) => Ok(entries.flatten().count() as u32),
            Err(e) => match self.classify(pid, e, "list descriptors") {
                ProcError::PermissionDenied { .. } => Ok(0),
                other => Err(other),
            },
        }
    }

    fn numeric_entries(&self) -> Vec<Pid> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter_map(|e| e.file_name().to_str().and_then(|n| n.parse::<Pid>().ok()))
            .collect()
    }
}

impl PlatformAdapter for ProcfsAdapter {
    fn name(&self) -> &'static str {
        "procfs"
    }

    fn enumerate(&self) -> Vec<(Pid, String)> {
        let mut out: Vec<(Pid, String)> = self
            .numeric_entries()
            .into_iter()
            .filter_map(|pid| {
                // exited between readdir and read: skip
                let comm = fs::read_to_string(self.proc_dir(pid).join("comm")).ok()?;
                Some((pid, comm.trim_end().to_string()))
            })
            .collect();
        out.sort_by_key(|(pid, _)| *pid);
        out
    }

    fn identity(&self, pid: Pid) -> Result<Identity> {
        let stat = self.stat(pid)?;
        let path = fs::read_link(self.proc_dir(pid).join("exe"))
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let start_secs = self.boot_time + stat.starttime / self.clock_ticks;
        let start_nanos = (stat.starttime % self.clock_ticks) * 1_000_000_000 / self.clock_ticks;
        let start_time = Utc
            .timestamp_opt(start_secs as i64, start_nanos as u32)
            .single();
        Ok(Identity {
            is_background: stat.is_background(),
            status: ProcessStatus::from_state_char(stat.state),
            ppid: stat.ppid,
            name: stat.comm,
            path,
            start_time,
        })
    }

    fn resources(&self, pid: Pid) -> Result<ResourceCounters> {
        let stat = self.stat(pid)?;
        let (io_read, io_write) = self
            .read_optional(pid, "io")?
            .map(|content| parse_io(&content))
            .unwrap_or((0, 0));
        Ok(ResourceCounters {
            mem_usage: u64::try_from(stat.rss).unwrap_or(0) * self.page_size,
            vm_usage: stat.vsize,
            io_read,
            io_write,
            thread_count: stat.num_threads,
            open_files: self.count_fds(pid)?,
        })
    }

    fn cpu_times(&self, pid: Pid) -> Result<CpuTimes> {
        let stat = self.stat(pid)?;
        Ok(CpuTimes {
            user: self.ticks_to_duration(stat.utime),
            system: self.ticks_to_duration(stat.stime),
        })
    }

    fn processor_count(&self) -> usize {
        self.num_cpus
    }

    fn priority(&self, pid: Pid) -> Result<Priority> {
        self.stat(pid).map(|s| Priority::from_nice(s.nice))
    }

    fn set_priority(&self, pid: Pid, priority: Priority) -> Result<()> {
        unix::set_priority(pid, priority)
    }

    fn signal(&self, pid: Pid, signal: Signal) -> Result<()> {
        unix::signal(pid, signal)
    }

    fn children(&self, pid: Pid) -> Vec<Pid> {
        let mut out: Vec<Pid> = self
            .numeric_entries()
            .into_iter()
            .filter(|candidate| {
                fs::read_to_string(self.proc_dir(*candidate).join("stat"))
                    .ok()
                    .and_then(|s| parse_stat(&s))
                    .is_some_and(|s| s.ppid == pid)
            })
            .collect();
        out.sort_unstable();
        out
    }

    fn command_line(&self, pid: Pid) -> Result<Vec<String>> {
        let raw = self.read(pid, "cmdline", "read command line")?;
        Ok(raw
            .split('\0')
            .filter(|arg| !arg.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn environment(&self, pid: Pid) -> Result<HashMap<String, String>> {
        let raw = self.read(pid, "environ", "read environment")?;
        Ok(parse_environment(raw.split('\0')))
    }

    fn privileges(&self, pid: Pid) -> Result<PrivilegesInfo> {
        let status = parse_status(&self.read(pid, "status", "read status")?);
        let username = status.uid.and_then(unix::user_name).unwrap_or_default();
        let groupname = status.gid.and_then(unix::group_name).unwrap_or_default();
        let groups = status
            .groups
            .iter()
            .map(|gid| unix::group_name(*gid).unwrap_or_else(|| gid.to_string()))
            .collect();
        Ok(PrivilegesInfo {
            username,
            groupname,
            uid: status.uid,
            euid: status.euid,
            groups,
            privileges: decode_capabilities(status.cap_eff),
            is_admin: status.euid == Some(0),
        })
    }

    fn suspend(&self, pid: Pid) -> Result<()> {
        unix::suspend(pid)
    }

    fn resume(&self, pid: Pid) -> Result<()> {
        unix::resume(pid)
    }

    fn affinity(&self, pid: Pid) -> Result<Vec<usize>> {
        let raw = unix::to_pid_t(pid)?;
        // SAFETY: cpu_set_t is plain data sized for the call.
        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            if libc::sched_getaffinity(raw, std::mem::size_of::<libc::cpu_set_t>(), &mut set) != 0 {
                return Err(os_error(pid, "read affinity"));
            }
            Ok((0..libc::CPU_SETSIZE as usize)
                .filter(|cpu| libc::CPU_ISSET(*cpu, &set))
                .collect())
        }
    }

    fn set_affinity(&self, pid: Pid, cores: &[usize]) -> Result<()> {
        if cores.is_empty() {
            return Err(ProcError::InvalidArgument("affinity set is empty".into()));
        }
        if let Some(core) = cores.iter().find(|c| **c >= libc::CPU_SETSIZE as usize) {
            return Err(ProcError::InvalidArgument(format!("core index {} out of range", core)));
        }
        let raw = unix::to_pid_t(pid)?;
        // SAFETY: indices are bounds-checked against CPU_SETSIZE above.
        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut set);
            for core in cores {
                libc::CPU_SET(*core, &mut set);
            }
            if libc::sched_setaffinity(raw, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
                return Err(os_error(pid, "set affinity"));
            }
        }
        Ok(())
    }

    fn set_memory_limit(&self, pid: Pid, bytes: u64) -> Result<()> {
        let raw = unix::to_pid_t(pid)?;
        // SAFETY: prlimit reads/writes only the rlimit structs passed in.
        unsafe {
            let mut current: libc::rlimit = std::mem::zeroed();
            if libc::prlimit(raw, libc::RLIMIT_AS, std::ptr::null(), &mut current) != 0 {
                return Err(os_error(pid, "read memory limit"));
            }
            // soft limit only; lowering the hard limit is irreversible without privileges
            let wanted = libc::rlimit {
                rlim_cur: (bytes as libc::rlim_t).min(current.rlim_max),
                rlim_max: current.rlim_max,
            };
            if libc::prlimit(raw, libc::RLIMIT_AS, &wanted, std::ptr::null_mut()) != 0 {
                return Err(os_error(pid, "set memory limit"));
            }
        }
        debug!(pid, bytes, "address-space limit applied");
        Ok(())
    }

    fn capabilities(&self, pid: Pid) -> Result<Vec<String>> {
        let status = parse_status(&self.read(pid, "status", "read status")?);
        Ok(decode_capabilities(status.cap_eff))
    }

    fn modules(&self, pid: Pid) -> Result<Vec<String>> {
        let maps = self.read(pid, "maps", "read memory maps")?;
        Ok(parse_maps(&maps))
    }

    fn file_descriptors(&self, pid: Pid) -> Result<Vec<FileDescriptor>> {
        let dir = self.require(pid)?.join("fd");
        let entries = fs::read_dir(&dir).map_err(|e| self.classify(pid, e, "list descriptors"))?;
        let mut out: Vec<FileDescriptor> = entries
            .flatten()
            .filter_map(|entry| {
                let fd = entry.file_name().to_str()?.parse::<i32>().ok()?;
                let target = fs::read_link(entry.path()).ok()?;
                let target_str = target.to_string_lossy().into_owned();
                Some(FileDescriptor {
                    fd,
                    kind: descriptor_kind(&target_str, &target),
                    path: target_str,
                })
            })
            .collect();
        out.sort_by_key(|d| d.fd);
        Ok(out)
    }

    fn io_priority(&self, pid: Pid) -> Result<u8> {
        let raw = unix::to_pid_t(pid)?;
        // SAFETY: ioprio_get takes two integers and touches no memory.
        let value = unsafe { libc::syscall(libc::SYS_ioprio_get, IOPRIO_WHO_PROCESS, raw) };
        if value < 0 {
            return Err(os_error(pid, "read io priority"));
        }
        // class bits are dropped; only the level within the class is reported
        Ok((value & 0x7) as u8)
    }

    fn set_io_priority(&self, pid: Pid, level: u8) -> Result<()> {
        if level > IO_PRIORITY_MAX {
            return Err(ProcError::InvalidArgument(format!(
                "io priority {level} out of range 0..={IO_PRIORITY_MAX}"
            )));
        }
        let raw = unix::to_pid_t(pid)?;
        let value = (IOPRIO_CLASS_BE << IOPRIO_CLASS_SHIFT) | libc::c_int::from(level);
        // SAFETY: ioprio_set takes three integers and touches no memory.
        let rc = unsafe { libc::syscall(libc::SYS_ioprio_set, IOPRIO_WHO_PROCESS, raw, value) };
        if rc != 0 {
            return Err(os_error(pid, "set io priority"));
        }
        debug!(pid, level, "io priority applied");
        Ok(())
    }

    fn network_connections(&self, pid: Pid) -> Result<Vec<NetworkConnection>> {
        let dir = self.require(pid)?.join("fd");
        let entries = fs::read_dir(&dir).map_err(|e| self.classify(pid, e, "list descriptors"))?;
        let owned: HashSet<u64> = entries
            .flatten()
            .filter_map(|entry| fs::read_link(entry.path()).ok())
            .filter_map(|target| socket_inode(&target.to_string_lossy()))
            .collect();
        let mut out = Vec::new();
        if owned.is_empty() {
            return Ok(out);
        }
        // the tables list the whole network namespace
        for (table, protocol) in SOCKET_TABLES {
            let Some(content) = self.read_optional(pid, table)? else {
                continue;
            };
            out.extend(
                parse_socket_table(&content, protocol)
                    .into_iter()
                    .filter(|(inode, _)| owned.contains(inode))
                    .map(|(_, connection)| connection),
            );
        }
        Ok(out)
    }
}

fn os_error(pid: Pid, operation: &'static str) -> ProcError {
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => ProcError::NotFound(pid),
        Some(libc::EPERM) | Some(libc::EACCES) => ProcError::denied(pid, operation),
        Some(libc::EINVAL) => ProcError::InvalidArgument(format!("{}: {}", operation, err)),
        _ => ProcError::Io(err),
    }
}
