//! Wires every component from one configuration around a shared adapter.

use crate::command::ShellExecutor;
use crate::config::ProcmanConfig;
use crate::controller::ProcessController;
use crate::cpu::CpuUsageTracker;
use crate::directory::ProcessDirectory;
use crate::inspector::ProcessInspector;
use crate::logging::StructuredLogger;
use crate::manager::ProcessManager;
use crate::monitor::ProcessMonitor;
use crate::platform::{self, PlatformAdapter};
use std::sync::Arc;
use tokio::runtime::Handle;

pub struct Toolkit {
    pub config: ProcmanConfig,
    pub adapter: Arc<dyn PlatformAdapter>,
    pub tracker: Arc<CpuUsageTracker>,
    pub inspector: Arc<ProcessInspector>,
    pub directory: ProcessDirectory,
    pub controller: Arc<ProcessController>,
    pub manager: ProcessManager,
    pub monitor: ProcessMonitor,
}

impl Toolkit {
    /// Components over the host's native adapter; watches run on `runtime`.
    pub fn new(config: ProcmanConfig, runtime: Handle) -> Self {
        Self::with_adapter(config, platform::native(), runtime)
    }

    pub fn with_adapter(
        config: ProcmanConfig,
        adapter: Arc<dyn PlatformAdapter>,
        runtime: Handle,
    ) -> Self {
        let tracker = Arc::new(CpuUsageTracker::new(Arc::clone(&adapter)));
        let inspector = Arc::new(ProcessInspector::with_options(
            Arc::clone(&adapter),
            Arc::clone(&tracker),
            config.inspector.clone(),
        ));
        let executor = match &config.manager.shell {
            Some(shell) => ShellExecutor::with_shell(shell.clone()),
            None => ShellExecutor::new(),
        };
        let directory = ProcessDirectory::new(Arc::clone(&inspector)).with_executor(Arc::new(executor));
        let controller = Arc::new(ProcessController::new(Arc::clone(&adapter)));
        let manager = ProcessManager::new(Arc::clone(&controller), config.manager.clone());
        let monitor = ProcessMonitor::with_config(Arc::clone(&inspector), runtime, config.monitor.clone());
        tracing::debug!(adapter = adapter.name(), "toolkit ready");
        Self {
            config,
            adapter,
            tracker,
            inspector,
            directory,
            controller,
            manager,
            monitor,
        }
    }

    /// Install the global subscriber from the `log` section. False when one
    /// is already installed.
    pub fn init_logging(&self) -> bool {
        StructuredLogger::try_init(self.config.log.json, &self.config.log.level)
    }
}
