//! Enumeration and search over every host process. Nothing is cached: each
//! call re-enumerates, and only matches pay for a full inspection.

use crate::command::{self, CommandExecutor};
use crate::inspector::ProcessInspector;
use crate::model::{Pid, Process};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ProcessDirectory {
    inspector: Arc<ProcessInspector>,
    executor: Option<Arc<dyn CommandExecutor>>,
}

impl ProcessDirectory {
    pub fn new(inspector: Arc<ProcessInspector>) -> Self {
        Self {
            inspector,
            executor: None,
        }
    }

    /// Fall back to an external listing tool when native enumeration is empty.
    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn enumerate_all(&self) -> Vec<(Pid, String)> {
        let native = self.inspector.adapter().enumerate();
        if !native.is_empty() {
            return native;
        }
        match &self.executor {
            Some(executor) => self.run_listing(executor.as_ref(), command::listing_command()),
            None => native,
        }
    }

    /// Exact (case-sensitive) name matches, fully inspected.
    pub fn find_by_name(&self, name: &str) -> Vec<Process> {
        self.inspect_matching(|candidate| candidate == name)
    }

    pub fn find_by_substring(&self, fragment: &str) -> Vec<Process> {
        self.inspect_matching(|candidate| candidate.contains(fragment))
    }

    /// Processes whose full command line contains `pattern`, via the
    /// external listing tool. Empty without an executor.
    pub fn find_by_command_pattern(&self, pattern: &str) -> Vec<Process> {
        let Some(executor) = &self.executor else {
            debug!(pattern, "no command executor installed");
            return Vec::new();
        };
        let listed = self.run_listing(executor.as_ref(), &command::pattern_command(pattern));
        self.inspect_pids(listed.into_iter().map(|(pid, _)| pid))
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.enumerate_all().iter().any(|(_, n)| n == name)
    }

    pub fn pids_by_name(&self, name: &str) -> Vec<Pid> {
        self.enumerate_all()
            .into_iter()
            .filter(|(_, n)| n == name)
            .map(|(pid, _)| pid)
            .collect()
    }

    /// Inspect every process and keep those matching `predicate`.
    pub fn find_where(&self, predicate: impl Fn(&Process) -> bool) -> Vec<Process> {
        self.inspect_pids(self.enumerate_all().into_iter().map(|(pid, _)| pid))
            .into_iter()
            .filter(|p| predicate(p))
            .collect()
    }

    fn inspect_matching(&self, matches: impl Fn(&str) -> bool) -> Vec<Process> {
        self.inspect_pids(
            self.enumerate_all()
                .into_iter()
                .filter(|(_, name)| matches(name))
                .map(|(pid, _)| pid),
        )
    }

    fn inspect_pids(&self, pids: impl Iterator<Item = Pid>) -> Vec<Process> {
        pids.filter_map(|pid| match self.inspector.inspect(pid) {
            Ok(p) => Some(p),
            Err(e) if e.is_absent() => None,
            Err(e) => {
                debug!(pid, error = %e, "skipping uninspectable process");
                None
            }
        })
        .collect()
    }

    fn run_listing(&self, executor: &dyn CommandExecutor, cmd: &str) -> Vec<(Pid, String)> {
        match executor.execute(cmd) {
            Ok(out) if out.success() => command::parse_listing(&out.stdout),
            // pgrep exits 1 when nothing matched
            Ok(out) => {
                debug!(command = cmd, status = out.status, "listing command returned no matches");
                command::parse_listing(&out.stdout)
            }
            Err(e) => {
                warn!(command = cmd, error = %e, "listing command failed");
                Vec::new()
            }
        }
    }
}
