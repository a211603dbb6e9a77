//! Windows hooks for the sysinfo adapter, on short-lived handles closed on drop.

#![allow(unsafe_code)]

use super::CpuTimes;
use crate::error::{ProcError, Result};
use crate::model::{Pid, Priority, Signal};
use std::ffi::c_void;
use std::time::Duration;
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{
    CloseHandle, ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, FILETIME, HANDLE,
};
use windows::Win32::Security::{
    GetTokenInformation, LookupPrivilegeNameW, TokenPrivileges, SE_PRIVILEGE_ENABLED,
    TOKEN_PRIVILEGES, TOKEN_QUERY,
};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Module32FirstW, Module32NextW, Thread32First, Thread32Next,
    MODULEENTRY32W, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32, TH32CS_SNAPTHREAD, THREADENTRY32,
};
use windows::Win32::System::JobObjects::{
    AssignProcessToJobObject, CreateJobObjectW, JobObjectExtendedLimitInformation,
    SetInformationJobObject, JOBOBJECT_EXTENDED_LIMIT_INFORMATION, JOB_OBJECT_LIMIT_PROCESS_MEMORY,
};
use windows::Win32::System::Threading::{
    GetPriorityClass, GetProcessAffinityMask, GetProcessTimes, OpenProcess, OpenProcessToken,
    OpenThread, ResumeThread, SetPriorityClass, SetProcessAffinityMask, SuspendThread,
    TerminateProcess, ABOVE_NORMAL_PRIORITY_CLASS, BELOW_NORMAL_PRIORITY_CLASS,
    HIGH_PRIORITY_CLASS, IDLE_PRIORITY_CLASS, NORMAL_PRIORITY_CLASS, PROCESS_ACCESS_RIGHTS,
    PROCESS_CREATION_FLAGS, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_SET_INFORMATION,
    PROCESS_SET_QUOTA, PROCESS_TERMINATE, REALTIME_PRIORITY_CLASS, THREAD_SUSPEND_RESUME,
};

struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: the handle came from a successful Open*/Create* call.
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

fn classify(pid: Pid, err: windows::core::Error, operation: &'static str) -> ProcError {
    let code = err.code();
    if code == ERROR_ACCESS_DENIED.to_hresult() {
        ProcError::denied(pid, operation)
    } else if code == ERROR_INVALID_PARAMETER.to_hresult() {
        ProcError::NotFound(pid)
    } else {
        ProcError::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
    }
}

fn open(pid: Pid, access: PROCESS_ACCESS_RIGHTS, operation: &'static str) -> Result<OwnedHandle> {
    // SAFETY: OpenProcess has no pointer arguments.
    unsafe { OpenProcess(access, false, pid) }
        .map(OwnedHandle)
        .map_err(|e| classify(pid, e, operation))
}

fn filetime_to_duration(ft: FILETIME) -> Duration {
    let hundred_ns = (u64::from(ft.dwHighDateTime) << 32) | u64::from(ft.dwLowDateTime);
    Duration::from_nanos(hundred_ns.saturating_mul(100))
}

pub(super) fn cpu_times(pid: Pid) -> Result<CpuTimes> {
    let process = open(pid, PROCESS_QUERY_LIMITED_INFORMATION, "read process times")?;
    let mut creation = FILETIME::default();
    let mut exit = FILETIME::default();
    let mut kernel = FILETIME::default();
    let mut user = FILETIME::default();
    // SAFETY: all out-pointers reference locals.
    unsafe { GetProcessTimes(process.0, &mut creation, &mut exit, &mut kernel, &mut user) }
        .map_err(|e| classify(pid, e, "read process times"))?;
    Ok(CpuTimes {
        user: filetime_to_duration(user),
        system: filetime_to_duration(kernel),
    })
}

fn priority_class(priority: Priority) -> PROCESS_CREATION_FLAGS {
    match priority {
        Priority::Idle => IDLE_PRIORITY_CLASS,
        Priority::Low => BELOW_NORMAL_PRIORITY_CLASS,
        Priority::Normal => NORMAL_PRIORITY_CLASS,
        Priority::High => HIGH_PRIORITY_CLASS,
        Priority::Realtime => REALTIME_PRIORITY_CLASS,
    }
}

pub(super) fn priority(pid: Pid) -> Result<Priority> {
    let process = open(pid, PROCESS_QUERY_LIMITED_INFORMATION, "read priority")?;
    // SAFETY: valid process handle.
    let class = unsafe { GetPriorityClass(process.0) };
    Ok(match class {
        c if c == IDLE_PRIORITY_CLASS.0 => Priority::Idle,
        c if c == BELOW_NORMAL_PRIORITY_CLASS.0 => Priority::Low,
        c if c == ABOVE_NORMAL_PRIORITY_CLASS.0 || c == HIGH_PRIORITY_CLASS.0 => Priority::High,
        c if c == REALTIME_PRIORITY_CLASS.0 => Priority::Realtime,
        _ => Priority::Normal,
    })
}

pub(super) fn set_priority(pid: Pid, priority: Priority) -> Result<()> {
    let process = open(pid, PROCESS_SET_INFORMATION, "set priority")?;
    // SAFETY: valid process handle.
    unsafe { SetPriorityClass(process.0, priority_class(priority)) }
        .map_err(|e| classify(pid, e, "set priority"))
}

/// Only terminating signals have a Windows equivalent.
pub(super) fn signal(pid: Pid, signal: Signal) -> Result<()> {
    if !signal.is_terminating() {
        return Err(ProcError::PlatformUnsupported("non-terminating signals"));
    }
    let process = open(pid, PROCESS_TERMINATE, "terminate")?;
    // SAFETY: valid process handle.
    unsafe { TerminateProcess(process.0, 1) }.map_err(|e| ProcError::SignalFailed {
        pid,
        signal: signal.raw(),
        reason: e.to_string(),
    })
}

fn for_each_thread(pid: Pid, mut apply: impl FnMut(&OwnedHandle) -> bool) -> Result<()> {
    // SAFETY: snapshot handle is owned and closed on drop.
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0) }
        .map(OwnedHandle)
        .map_err(|e| classify(pid, e, "snapshot threads"))?;
    let mut entry = THREADENTRY32 {
        dwSize: std::mem::size_of::<THREADENTRY32>() as u32,
        ..Default::default()
    };
    let mut touched = 0usize;
    let mut failed = false;
    // SAFETY: entry is sized correctly and lives across the iteration.
    let mut more = unsafe { Thread32First(snapshot.0, &mut entry) }.is_ok();
    while more {
        if entry.th32OwnerProcessID == pid {
            match unsafe { OpenThread(THREAD_SUSPEND_RESUME, false, entry.th32ThreadID) } {
                Ok(handle) => {
                    let thread = OwnedHandle(handle);
                    if apply(&thread) {
                        touched += 1;
                    } else {
                        failed = true;
                    }
                }
                Err(_) => failed = true,
            }
        }
        more = unsafe { Thread32Next(snapshot.0, &mut entry) }.is_ok();
    }
    match (touched, failed) {
        (0, false) => Err(ProcError::NotFound(pid)),
        (0, true) => Err(ProcError::denied(pid, "suspend or resume threads")),
        _ => Ok(()),
    }
}

pub(super) fn suspend(pid: Pid) -> Result<()> {
    // SAFETY: thread handle opened with THREAD_SUSPEND_RESUME.
    for_each_thread(pid, |t| unsafe { SuspendThread(t.0) } != u32::MAX)
}

pub(super) fn resume(pid: Pid) -> Result<()> {
    // SAFETY: thread handle opened with THREAD_SUSPEND_RESUME.
    for_each_thread(pid, |t| unsafe { ResumeThread(t.0) } != u32::MAX)
}

pub(super) fn affinity(pid: Pid) -> Result<Vec<usize>> {
    let process = open(pid, PROCESS_QUERY_LIMITED_INFORMATION, "read affinity")?;
    let mut process_mask = 0usize;
    let mut system_mask = 0usize;
    // SAFETY: out-pointers reference locals.
    unsafe { GetProcessAffinityMask(process.0, &mut process_mask, &mut system_mask) }
        .map_err(|e| classify(pid, e, "read affinity"))?;
    Ok((0..usize::BITS as usize)
        .filter(|bit| process_mask & (1usize << bit) != 0)
        .collect())
}

pub(super) fn set_affinity(pid: Pid, cores: &[usize]) -> Result<()> {
    if cores.is_empty() {
        return Err(ProcError::InvalidArgument("affinity set is empty".into()));
    }
    let mut mask = 0usize;
    for core in cores {
        if *core >= usize::BITS as usize {
            return Err(ProcError::InvalidArgument(format!("core index {} out of range", core)));
        }
        mask |= 1usize << core;
    }
    let process = open(pid, PROCESS_SET_INFORMATION, "set affinity")?;
    // SAFETY: valid process handle.
    unsafe { SetProcessAffinityMask(process.0, mask) }.map_err(|e| classify(pid, e, "set affinity"))
}

/// Places the process in a fresh job object with a per-process memory cap.
pub(super) fn set_memory_limit(pid: Pid, bytes: u64) -> Result<()> {
    let process = open(pid, PROCESS_SET_QUOTA | PROCESS_TERMINATE, "set memory limit")?;
    // SAFETY: job handle is owned; the limit struct outlives the call.
    unsafe {
        let job = CreateJobObjectW(None, PCWSTR::null())
            .map(OwnedHandle)
            .map_err(|e| classify(pid, e, "create job object"))?;
        let mut limits = JOBOBJECT_EXTENDED_LIMIT_INFORMATION::default();
        limits.BasicLimitInformation.LimitFlags = JOB_OBJECT_LIMIT_PROCESS_MEMORY;
        limits.ProcessMemoryLimit = usize::try_from(bytes).unwrap_or(usize::MAX);
        SetInformationJobObject(
            job.0,
            JobObjectExtendedLimitInformation,
            &limits as *const _ as *const c_void,
            std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
        )
        .map_err(|e| classify(pid, e, "configure job object"))?;
        AssignProcessToJobObject(job.0, process.0).map_err(|e| classify(pid, e, "assign job object"))
    }
}

fn wide_to_string(buf: &[u16]) -> String {
    let len = buf.iter().position(|c| *c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

pub(super) fn modules(pid: Pid) -> Result<Vec<String>> {
    // SAFETY: snapshot handle is owned and closed on drop.
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid) }
        .map(OwnedHandle)
        .map_err(|e| classify(pid, e, "snapshot modules"))?;
    let mut entry = MODULEENTRY32W {
        dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
        ..Default::default()
    };
    let mut out = Vec::new();
    // SAFETY: entry is sized correctly and lives across the iteration.
    let mut more = unsafe { Module32FirstW(snapshot.0, &mut entry) }.is_ok();
    while more {
        out.push(wide_to_string(&entry.szExePath));
        more = unsafe { Module32NextW(snapshot.0, &mut entry) }.is_ok();
    }
    Ok(out)
}

pub(super) fn windows_privileges(pid: Pid) -> Result<Vec<String>> {
    let process = open(pid, PROCESS_QUERY_LIMITED_INFORMATION, "open process token")?;
    let mut raw_token = HANDLE::default();
    // SAFETY: out-pointer references a local; token closed on drop.
    unsafe { OpenProcessToken(process.0, TOKEN_QUERY, &mut raw_token) }
        .map_err(|e| classify(pid, e, "open process token"))?;
    let token = OwnedHandle(raw_token);

    let mut needed = 0u32;
    // SAFETY: sizing call, no buffer.
    let _ = unsafe { GetTokenInformation(token.0, TokenPrivileges, None, 0, &mut needed) };
    if needed == 0 {
        return Ok(Vec::new());
    }
    // u64 backing keeps TOKEN_PRIVILEGES aligned
    let mut buf = vec![0u64; (needed as usize).div_ceil(8)];
    unsafe {
        GetTokenInformation(
            token.0,
            TokenPrivileges,
            Some(buf.as_mut_ptr() as *mut c_void),
            needed,
            &mut needed,
        )
    }
    .map_err(|e| classify(pid, e, "read token privileges"))?;

    // SAFETY: the buffer was filled by GetTokenInformation(TokenPrivileges).
    let entries = unsafe {
        let header = &*(buf.as_ptr() as *const TOKEN_PRIVILEGES);
        std::slice::from_raw_parts(header.Privileges.as_ptr(), header.PrivilegeCount as usize)
    };
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut name = [0u16; 256];
        let mut len = name.len() as u32;
        let found = unsafe {
            LookupPrivilegeNameW(PCWSTR::null(), &entry.Luid, PWSTR(name.as_mut_ptr()), &mut len)
        };
        if found.is_err() {
            continue;
        }
        let mut label = String::from_utf16_lossy(&name[..len as usize]);
        if entry.Attributes.0 & SE_PRIVILEGE_ENABLED.0 != 0 {
            label.push_str(" (enabled)");
        }
        out.push(label);
    }
    Ok(out)
}
