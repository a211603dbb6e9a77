//! macOS hooks for the sysinfo adapter: kernel task info through `proc_pidinfo`.
//! Affinity and per-process memory limits have no public Darwin primitive.

#![allow(unsafe_code)]

use super::CpuTimes;
use crate::error::{ProcError, Result};
use crate::model::Pid;
use std::sync::OnceLock;
use std::time::Duration;

pub(super) use super::unix::{priority, resume, set_priority, signal, suspend};

/// (numer, denom) converting mach absolute time units to nanoseconds.
fn timebase() -> (u64, u64) {
    static TIMEBASE: OnceLock<(u64, u64)> = OnceLock::new();
    *TIMEBASE.get_or_init(|| {
        let mut info = libc::mach_timebase_info { numer: 0, denom: 0 };
        // SAFETY: writes into the struct we own.
        let rc = unsafe { libc::mach_timebase_info(&mut info) };
        if rc != 0 || info.denom == 0 {
            (1, 1)
        } else {
            (u64::from(info.numer), u64::from(info.denom))
        }
    })
}

pub(super) fn cpu_times(pid: Pid) -> Result<CpuTimes> {
    let raw = super::unix::to_pid_t(pid)?;
    // SAFETY: proc_taskinfo is plain data and the size passed matches it.
    let (rc, info) = unsafe {
        let mut info: libc::proc_taskinfo = std::mem::zeroed();
        let size = std::mem::size_of::<libc::proc_taskinfo>() as libc::c_int;
        let rc = libc::proc_pidinfo(
            raw,
            libc::PROC_PIDTASKINFO,
            0,
            &mut info as *mut _ as *mut libc::c_void,
            size,
        );
        (rc, info)
    };
    if rc <= 0 {
        let err = std::io::Error::last_os_error();
        return Err(match err.raw_os_error() {
            Some(libc::ESRCH) => ProcError::NotFound(pid),
            Some(libc::EPERM) | Some(libc::EACCES) => ProcError::denied(pid, "read task info"),
            _ => ProcError::Io(err),
        });
    }
    let (numer, denom) = timebase();
    let to_duration = |ticks: u64| Duration::from_nanos(ticks.saturating_mul(numer) / denom);
    Ok(CpuTimes {
        user: to_duration(info.pti_total_user),
        system: to_duration(info.pti_total_system),
    })
}

pub(super) fn affinity(_pid: Pid) -> Result<Vec<usize>> {
    Err(ProcError::PlatformUnsupported("process affinity"))
}

pub(super) fn set_affinity(_pid: Pid, _cores: &[usize]) -> Result<()> {
    Err(ProcError::PlatformUnsupported("process affinity"))
}

pub(super) fn set_memory_limit(_pid: Pid, _bytes: u64) -> Result<()> {
    Err(ProcError::PlatformUnsupported("memory limit"))
}

pub(super) fn modules(_pid: Pid) -> Result<Vec<String>> {
    Err(ProcError::PlatformUnsupported("module listing"))
}

pub(super) fn windows_privileges(_pid: Pid) -> Result<Vec<String>> {
    Err(ProcError::PlatformUnsupported("windows privileges"))
}
