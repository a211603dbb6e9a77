//! Builds full [`Process`] records from adapter queries.
//!
//! A sub-query that reports the process gone aborts the whole inspection with
//! `NotFound`. A denied or unsupported sub-query leaves its field at the zero
//! value. A vanished read is retried once before it surfaces as `NotFound`.

use crate::config::InspectorConfig;
use crate::cpu::CpuUsageTracker;
use crate::error::{ProcError, Result};
use crate::model::{
    FileDescriptor, NetworkConnection, Pid, Process, ProcessResource, ProcessStatus,
    PrivilegesInfo,
};
use crate::platform::PlatformAdapter;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Parent-to-children relation rooted at one pid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTree {
    pub pid: Pid,
    pub name: String,
    pub children: Vec<ProcessTree>,
}

impl ProcessTree {
    /// Number of processes in the tree, root included.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(ProcessTree::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.pid == pid || self.children.iter().any(|c| c.contains(pid))
    }
}

/// Keep the value on success; turn a denied or unsupported read into its default.
fn tolerate<T: Default>(pid: Pid, what: &str, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_permission_denied() || e.is_unsupported() => {
            trace!(pid, field = what, error = %e, "leaving field empty");
            Ok(T::default())
        }
        Err(e) => Err(e),
    }
}

/// Collapse a vanished read into `NotFound` once retries are exhausted.
fn settle<T>(pid: Pid, result: Result<T>) -> Result<T> {
    result.map_err(|e| match e {
        ProcError::TransientRead(_) => ProcError::NotFound(pid),
        other => other,
    })
}

pub struct ProcessInspector {
    adapter: Arc<dyn PlatformAdapter>,
    tracker: Arc<CpuUsageTracker>,
    options: InspectorConfig,
}

impl ProcessInspector {
    pub fn new(adapter: Arc<dyn PlatformAdapter>, tracker: Arc<CpuUsageTracker>) -> Self {
        Self::with_options(adapter, tracker, InspectorConfig::default())
    }

    pub fn with_options(
        adapter: Arc<dyn PlatformAdapter>,
        tracker: Arc<CpuUsageTracker>,
        options: InspectorConfig,
    ) -> Self {
        Self {
            adapter,
            tracker,
            options,
        }
    }

    pub fn adapter(&self) -> &Arc<dyn PlatformAdapter> {
        &self.adapter
    }

    pub fn tracker(&self) -> &Arc<CpuUsageTracker> {
        &self.tracker
    }

    pub fn options(&self) -> &InspectorConfig {
        &self.options
    }

    /// Full snapshot of `pid`.
    pub fn inspect(&self, pid: Pid) -> Result<Process> {
        self.retrying(pid, || self.build(pid))
    }

    pub fn inspect_self(&self) -> Result<Process> {
        self.inspect(std::process::id())
    }

    /// Status only; skips resources, privileges and CPU sampling.
    pub fn status(&self, pid: Pid) -> Result<ProcessStatus> {
        self.retrying(pid, || self.adapter.identity(pid).map(|id| id.status))
    }

    pub fn parent_pid(&self, pid: Pid) -> Result<Pid> {
        self.retrying(pid, || self.adapter.identity(pid).map(|id| id.ppid))
    }

    pub fn path(&self, pid: Pid) -> Result<String> {
        self.retrying(pid, || self.adapter.identity(pid).map(|id| id.path))
    }

    /// Wall time since the process started; zero when the start time is unknown.
    pub fn running_time(&self, pid: Pid) -> Result<Duration> {
        let started = self.retrying(pid, || self.adapter.identity(pid).map(|id| id.start_time))?;
        Ok(started
            .and_then(|t| (Utc::now() - t).to_std().ok())
            .unwrap_or_default())
    }

    pub fn resources(&self, pid: Pid) -> Result<ProcessResource> {
        self.retrying(pid, || self.resource_record(pid))
    }

    pub fn children(&self, pid: Pid) -> Vec<Pid> {
        self.adapter.children(pid)
    }

    /// Descendants of `pid`. A pid already seen is not expanded again.
    pub fn process_tree(&self, pid: Pid) -> Result<ProcessTree> {
        let name = self.retrying(pid, || self.adapter.identity(pid).map(|id| id.name))?;
        let mut seen = HashSet::from([pid]);
        Ok(ProcessTree {
            pid,
            name,
            children: self.subtrees(pid, &mut seen),
        })
    }

    fn subtrees(&self, pid: Pid, seen: &mut HashSet<Pid>) -> Vec<ProcessTree> {
        let mut out = Vec::new();
        for child in self.adapter.children(pid) {
            if !seen.insert(child) {
                continue;
            }
            // exited between listing and lookup
            let Ok(identity) = self.adapter.identity(child) else {
                continue;
            };
            out.push(ProcessTree {
                pid: child,
                name: identity.name,
                children: self.subtrees(child, seen),
            });
        }
        out
    }

    pub fn privileges(&self, pid: Pid) -> Result<PrivilegesInfo> {
        self.retrying(pid, || self.privilege_record(pid))
    }

    pub fn command_line(&self, pid: Pid) -> Result<Vec<String>> {
        self.retrying(pid, || self.adapter.command_line(pid))
    }

    pub fn environment(&self, pid: Pid) -> Result<HashMap<String, String>> {
        self.retrying(pid, || self.adapter.environment(pid))
    }

    pub fn capabilities(&self, pid: Pid) -> Result<Vec<String>> {
        self.retrying(pid, || self.adapter.capabilities(pid))
    }

    pub fn modules(&self, pid: Pid) -> Result<Vec<String>> {
        self.retrying(pid, || self.adapter.modules(pid))
    }

    pub fn file_descriptors(&self, pid: Pid) -> Result<Vec<FileDescriptor>> {
        self.retrying(pid, || self.adapter.file_descriptors(pid))
    }

    /// Sockets `pid` holds open, with their endpoints and state.
    pub fn network_connections(&self, pid: Pid) -> Result<Vec<NetworkConnection>> {
        self.retrying(pid, || self.adapter.network_connections(pid))
    }

    fn retrying<T>(&self, pid: Pid, mut query: impl FnMut() -> Result<T>) -> Result<T> {
        match query() {
            Err(ProcError::TransientRead(_)) => {
                debug!(pid, "read raced with process exit, retrying once");
                settle(pid, query())
            }
            other => settle(pid, other),
        }
    }

    fn resource_record(&self, pid: Pid) -> Result<ProcessResource> {
        let counters = tolerate(pid, "resources", self.adapter.resources(pid))?;
        let cpu_usage = match self.tracker.sample(pid) {
            Ok(usage) => usage,
            Err(e) if e.is_permission_denied() || e.is_unsupported() => 0.0,
            Err(e) => return Err(e),
        };
        Ok(ProcessResource {
            cpu_usage,
            mem_usage: counters.mem_usage,
            vm_usage: counters.vm_usage,
            io_read: counters.io_read,
            io_write: counters.io_write,
            thread_count: counters.thread_count,
            open_files: counters.open_files,
        })
    }

    fn privilege_record(&self, pid: Pid) -> Result<PrivilegesInfo> {
        let mut info = self.adapter.privileges(pid)?;
        if info.privileges.is_empty() {
            info.privileges = tolerate(pid, "privileges", self.adapter.windows_privileges(pid))?;
        }
        Ok(info)
    }

    fn build(&self, pid: Pid) -> Result<Process> {
        let identity = tolerate(pid, "identity", self.adapter.identity(pid))?;
        let resources = self.resource_record(pid)?;
        let priority = tolerate(pid, "priority", self.adapter.priority(pid))?;
        let security = if self.options.privileges {
            tolerate(pid, "privileges", self.privilege_record(pid).map(Some))?
        } else {
            None
        };

        let command = if self.options.command_line {
            tolerate(pid, "command", self.adapter.command_line(pid))?.join(" ")
        } else {
            String::new()
        };
        let environment = if self.options.environment {
            tolerate(pid, "environment", self.adapter.environment(pid))?
        } else {
            HashMap::new()
        };

        Ok(Process {
            pid,
            ppid: identity.ppid,
            command: if command.is_empty() {
                identity.name.clone()
            } else {
                command
            },
            name: identity.name,
            path: identity.path,
            status: identity.status,
            username: security
                .as_ref()
                .map(|s| s.username.clone())
                .unwrap_or_default(),
            priority,
            start_time: identity.start_time,
            resources,
            environment,
            is_background: identity.is_background,
            privileges: security,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerate_keeps_absence_fatal() {
        let denied: Result<u32> = Err(ProcError::denied(7, "read"));
        assert_eq!(tolerate(7, "x", denied).unwrap(), 0);

        let unsupported: Result<Vec<String>> = Err(ProcError::PlatformUnsupported("modules"));
        assert!(tolerate(7, "x", unsupported).unwrap().is_empty());

        let gone: Result<u32> = Err(ProcError::NotFound(7));
        assert!(matches!(tolerate(7, "x", gone), Err(ProcError::NotFound(7))));
    }

    #[test]
    fn tree_counts_descendants() {
        let tree = ProcessTree {
            pid: 1,
            name: "init".into(),
            children: vec![
                ProcessTree {
                    pid: 2,
                    name: "a".into(),
                    children: vec![ProcessTree {
                        pid: 4,
                        name: "c".into(),
                        children: vec![],
                    }],
                },
                ProcessTree {
                    pid: 3,
                    name: "b".into(),
                    children: vec![],
                },
            ],
        };
        assert_eq!(tree.len(), 4);
        assert!(tree.contains(4));
        assert!(!tree.contains(5));
    }
}
