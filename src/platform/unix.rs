//! POSIX primitives shared by the procfs and sysinfo adapters.

#![allow(unsafe_code)]

use crate::error::{ProcError, Result};
use crate::model::{Pid, Priority, Signal};
use std::ffi::{CStr, CString};

/// Convert to `pid_t`, refusing values `kill(2)` would treat as group targets.
pub(super) fn to_pid_t(pid: Pid) -> Result<libc::pid_t> {
    match libc::pid_t::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(raw),
        _ => Err(ProcError::NotFound(pid)),
    }
}

pub(super) fn signal(pid: Pid, signal: Signal) -> Result<()> {
    let raw = to_pid_t(pid)?;
    // SAFETY: kill has no memory-safety preconditions.
    let rc = unsafe { libc::kill(raw, signal.raw()) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    Err(match err.raw_os_error() {
        Some(libc::ESRCH) => ProcError::NotFound(pid),
        Some(libc::EPERM) => ProcError::denied(pid, "signal"),
        _ => ProcError::SignalFailed {
            pid,
            signal: signal.raw(),
            reason: err.to_string(),
        },
    })
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno_location()
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__error()
}

#[cfg(any(target_os = "netbsd", target_os = "openbsd"))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno()
}

/// Current nice value. `getpriority` may legitimately return -1, so errno is
/// cleared first and checked afterwards.
pub(super) fn nice(pid: Pid) -> Result<i32> {
    let raw = to_pid_t(pid)?;
    // SAFETY: errno is thread-local; getpriority takes plain integers.
    let (value, errno) = unsafe {
        *errno_location() = 0;
        let value = libc::getpriority(libc::PRIO_PROCESS, raw as libc::id_t);
        (value, *errno_location())
    };
    match errno {
        0 => Ok(value),
        libc::ESRCH => Err(ProcError::NotFound(pid)),
        libc::EPERM | libc::EACCES => Err(ProcError::denied(pid, "read priority")),
        code => Err(ProcError::Io(std::io::Error::from_raw_os_error(code))),
    }
}

pub(super) fn priority(pid: Pid) -> Result<Priority> {
    nice(pid).map(Priority::from_nice)
}

pub(super) fn set_priority(pid: Pid, priority: Priority) -> Result<()> {
    let raw = to_pid_t(pid)?;
    // SAFETY: setpriority takes plain integers.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, raw as libc::id_t, priority.to_nice()) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    Err(match err.raw_os_error() {
        Some(libc::ESRCH) => ProcError::NotFound(pid),
        Some(libc::EPERM) | Some(libc::EACCES) => ProcError::denied(pid, "set priority"),
        _ => ProcError::Io(err),
    })
}

pub(super) fn suspend(pid: Pid) -> Result<()> {
    signal(pid, Signal::STOP)
}

pub(super) fn resume(pid: Pid) -> Result<()> {
    signal(pid, Signal::CONT)
}

const NSS_BUFFER: usize = 16 * 1024;

pub(super) fn user_name(uid: u32) -> Option<String> {
    let mut buf = vec![0 as libc::c_char; NSS_BUFFER];
    // SAFETY: passwd is plain data; getpwuid_r writes into our buffers only.
    unsafe {
        let mut pwd: libc::passwd = std::mem::zeroed();
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let rc = libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result);
        if rc != 0 || result.is_null() || pwd.pw_name.is_null() {
            return None;
        }
        Some(CStr::from_ptr(pwd.pw_name).to_string_lossy().into_owned())
    }
}

pub(super) fn group_name(gid: u32) -> Option<String> {
    let mut buf = vec![0 as libc::c_char; NSS_BUFFER];
    // SAFETY: group is plain data; getgrgid_r writes into our buffers only.
    unsafe {
        let mut grp: libc::group = std::mem::zeroed();
        let mut result: *mut libc::group = std::ptr::null_mut();
        let rc = libc::getgrgid_r(gid, &mut grp, buf.as_mut_ptr(), buf.len(), &mut result);
        if rc != 0 || result.is_null() || grp.gr_name.is_null() {
            return None;
        }
        Some(CStr::from_ptr(grp.gr_name).to_string_lossy().into_owned())
    }
}

/// Uid and primary gid of the account `name`.
pub(super) fn user_ids(name: &str) -> Result<(u32, u32)> {
    let unknown = || ProcError::InvalidArgument(format!("unknown user '{name}'"));
    let cname = CString::new(name).map_err(|_| unknown())?;
    let mut buf = vec![0 as libc::c_char; NSS_BUFFER];
    // SAFETY: passwd is plain data; getpwnam_r writes into our buffers only.
    unsafe {
        let mut pwd: libc::passwd = std::mem::zeroed();
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let rc = libc::getpwnam_r(cname.as_ptr(), &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result);
        if rc != 0 || result.is_null() {
            return Err(unknown());
        }
        Ok((pwd.pw_uid, pwd.pw_gid))
    }
}

/// Host hooks for the sysinfo adapter on POSIX systems without a dedicated module.
#[cfg(not(target_os = "macos"))]
pub(super) mod generic {
    use super::*;
    use crate::platform::CpuTimes;

    pub(in crate::platform) use super::{priority, resume, set_priority, signal, suspend};

    pub(in crate::platform) fn cpu_times(_pid: Pid) -> Result<CpuTimes> {
        Err(ProcError::PlatformUnsupported("processor time query"))
    }

    pub(in crate::platform) fn affinity(_pid: Pid) -> Result<Vec<usize>> {
        Err(ProcError::PlatformUnsupported("process affinity"))
    }

    pub(in crate::platform) fn set_affinity(_pid: Pid, _cores: &[usize]) -> Result<()> {
        Err(ProcError::PlatformUnsupported("process affinity"))
    }

    pub(in crate::platform) fn set_memory_limit(_pid: Pid, _bytes: u64) -> Result<()> {
        Err(ProcError::PlatformUnsupported("memory limit"))
    }

    pub(in crate::platform) fn modules(_pid: Pid) -> Result<Vec<String>> {
        Err(ProcError::PlatformUnsupported("module listing"))
    }

    pub(in crate::platform) fn windows_privileges(_pid: Pid) -> Result<Vec<String>> {
        Err(ProcError::PlatformUnsupported("windows privileges"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_zero_never_reaches_kill() {
        assert!(matches!(signal(0, Signal::TERM), Err(ProcError::NotFound(0))));
        assert!(matches!(to_pid_t(u32::MAX), Err(ProcError::NotFound(_))));
    }

    #[test]
    fn own_priority_is_readable() {
        let pid = std::process::id();
        assert!(nice(pid).is_ok());
    }

    #[test]
    fn root_user_resolves() {
        assert_eq!(user_name(0).as_deref(), Some("root"));
        assert_eq!(user_ids("root").unwrap(), (0, 0));
        assert!(matches!(
            user_ids("no-such-account-here"),
            Err(ProcError::InvalidArgument(_))
        ));
    }
}
