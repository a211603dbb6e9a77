//! Lifecycle mutation: spawn, signal, suspend/resume, scheduling and limits.
//!
//! Control calls return `Ok(false)` when the target does not exist and an
//! error when an existing process refused the operation.

use crate::command::shell_command;
use crate::error::{ProcError, Result};
use crate::model::{Pid, Priority, Signal};
use crate::platform::{PlatformAdapter, IO_PRIORITY_MAX};
use serde::{Deserialize, Serialize};
use std::process::{Child, Stdio};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle of a controlled process as seen from this side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    Spawned,
    Running,
    Suspended,
    Terminated,
}

impl ControlState {
    pub fn can_transition(self, next: ControlState) -> bool {
        use ControlState::*;
        matches!(
            (self, next),
            (Spawned, Running)
                | (Spawned, Terminated)
                | (Running, Suspended)
                | (Running, Terminated)
                | (Suspended, Running)
                | (Suspended, Terminated)
        ) || (self == next && self != Terminated)
    }

    pub fn transition(self, next: ControlState) -> Result<ControlState> {
        if self.can_transition(next) {
            Ok(next)
        } else {
            Err(ProcError::InvalidArgument(format!(
                "cannot move a {self:?} process to {next:?}"
            )))
        }
    }

    pub fn is_terminal(self) -> bool {
        self == ControlState::Terminated
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Detach from the caller's session and terminal
    pub background: bool,
    /// Pipe stdout and stderr back to the caller
    pub capture_output: bool,
    /// Shell override; platform default when unset
    pub shell: Option<String>,
    /// Account to run as (unix only); the caller's when unset
    pub user: Option<String>,
}

/// A process this side created. Dropping `child` does not kill it.
#[derive(Debug)]
pub struct SpawnedProcess {
    pub pid: Pid,
    pub child: Child,
}

fn present(result: Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_absent() => Ok(false),
        Err(e) => Err(e),
    }
}

pub struct ProcessController {
    adapter: Arc<dyn PlatformAdapter>,
}

impl ProcessController {
    pub fn new(adapter: Arc<dyn PlatformAdapter>) -> Self {
        Self { adapter }
    }

    /// Start `command` through the shell. Success means the OS accepted it.
    pub fn spawn(&self, command: &str, options: &SpawnOptions) -> Result<SpawnedProcess> {
        if command.trim().is_empty() {
            return Err(ProcError::InvalidArgument("empty command".into()));
        }
        let mut cmd = shell_command(options.shell.as_deref(), command);
        cmd.stdin(Stdio::null());
        if options.capture_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else if options.background {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        if options.background {
            detach(&mut cmd);
        }
        if let Some(user) = &options.user {
            run_as(&mut cmd, user)?;
        }
        let child = cmd.spawn().map_err(|e| ProcError::SpawnFailed {
            command: command.to_string(),
            reason: e.to_string(),
        })?;
        let pid = child.id();
        info!(pid, command, background = options.background, user = ?options.user, "spawned process");
        Ok(SpawnedProcess { pid, child })
    }

    /// [`spawn`](Self::spawn) under another account. Needs the privilege to
    /// switch to it, which usually means running as root.
    pub fn spawn_as_user(
        &self,
        command: &str,
        user: &str,
        options: &SpawnOptions,
    ) -> Result<SpawnedProcess> {
        let options = SpawnOptions {
            user: Some(user.to_string()),
            ..options.clone()
        };
        self.spawn(command, &options)
    }

    pub fn terminate_by_pid(&self, pid: Pid, signal: Signal) -> Result<bool> {
        let delivered = present(self.adapter.signal(pid, signal))?;
        if delivered {
            info!(pid, %signal, "sent termination signal");
        } else {
            debug!(pid, "terminate target does not exist");
        }
        Ok(delivered)
    }

    /// Signal every process named `name`. True if at least one delivery
    /// succeeded; individual failures are logged.
    pub fn terminate_by_name(&self, name: &str, signal: Signal) -> bool {
        let me = std::process::id();
        let mut any = false;
        for (pid, _) in self
            .adapter
            .enumerate()
            .into_iter()
            .filter(|(pid, n)| n == name && *pid != me)
        {
            match self.terminate_by_pid(pid, signal) {
                Ok(true) => any = true,
                Ok(false) => {}
                Err(e) => warn!(pid, name, error = %e, "failed to terminate process"),
            }
        }
        any
    }

    pub fn send_signal(&self, pid: Pid, signal: Signal) -> Result<bool> {
        present(self.adapter.signal(pid, signal))
    }

    pub fn suspend(&self, pid: Pid) -> Result<bool> {
        present(self.adapter.suspend(pid))
    }

    pub fn resume(&self, pid: Pid) -> Result<bool> {
        present(self.adapter.resume(pid))
    }

    pub fn priority(&self, pid: Pid) -> Result<Priority> {
        self.adapter.priority(pid)
    }

    pub fn set_priority(&self, pid: Pid, priority: Priority) -> Result<bool> {
        present(self.adapter.set_priority(pid, priority))
    }

    pub fn affinity(&self, pid: Pid) -> Result<Vec<usize>> {
        self.adapter.affinity(pid)
    }

    pub fn set_affinity(&self, pid: Pid, cores: &[usize]) -> Result<bool> {
        if cores.is_empty() {
            return Err(ProcError::InvalidArgument("empty affinity set".into()));
        }
        present(self.adapter.set_affinity(pid, cores))
    }

    /// Cap the address space of `pid`. Best effort where the OS allows it.
    pub fn set_memory_limit(&self, pid: Pid, bytes: u64) -> Result<bool> {
        present(self.adapter.set_memory_limit(pid, bytes))
    }

    pub fn io_priority(&self, pid: Pid) -> Result<u8> {
        self.adapter.io_priority(pid)
    }

    /// Best-effort I/O level, 0 (highest) to [`IO_PRIORITY_MAX`].
    pub fn set_io_priority(&self, pid: Pid, level: u8) -> Result<bool> {
        if level > IO_PRIORITY_MAX {
            return Err(ProcError::InvalidArgument(format!(
                "io priority {level} out of range 0..={IO_PRIORITY_MAX}"
            )));
        }
        present(self.adapter.set_io_priority(pid, level))
    }
}

#[cfg(unix)]
fn detach(cmd: &mut std::process::Command) {
    use std::os::unix::process::CommandExt;
    // own process group: terminal job-control signals no longer reach it
    cmd.process_group(0);
}

#[cfg(windows)]
fn detach(cmd: &mut std::process::Command) {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_cmd: &mut std::process::Command) {}

#[cfg(unix)]
fn run_as(cmd: &mut std::process::Command, user: &str) -> Result<()> {
    use std::os::unix::process::CommandExt;
    let (uid, gid) = crate::platform::user_ids(user)?;
    cmd.uid(uid).gid(gid);
    Ok(())
}

#[cfg(not(unix))]
fn run_as(_cmd: &mut std::process::Command, _user: &str) -> Result<()> {
    Err(ProcError::PlatformUnsupported("spawning as another user"))
}
