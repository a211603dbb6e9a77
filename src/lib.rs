//! procman: cross-platform process inspection, control and monitoring.
//!
//! Modular structure:
//! - [`platform`]: one adapter per native instrumentation model
//! - [`cpu`]: CPU usage by delta sampling
//! - [`inspector`]: full process records from adapter queries
//! - [`directory`]: enumeration and search
//! - [`controller`]: spawn, signal, suspend, scheduling and limits
//! - [`manager`]: bounded registry of self-created processes
//! - [`monitor`]: asynchronous status and resource watches
//! - [`logging`]: structured logging

pub mod command;
pub mod config;
pub mod controller;
pub mod cpu;
pub mod directory;
pub mod error;
pub mod inspector;
pub mod logging;
pub mod manager;
pub mod model;
pub mod monitor;
pub mod platform;
pub mod toolkit;

pub use command::{CommandExecutor, CommandOutput, ShellExecutor};
pub use config::ProcmanConfig;
pub use controller::{ControlState, ProcessController, SpawnOptions, SpawnedProcess};
pub use cpu::CpuUsageTracker;
pub use directory::ProcessDirectory;
pub use error::{ErrorKind, ProcError, Result};
pub use inspector::{ProcessInspector, ProcessTree};
pub use logging::StructuredLogger;
pub use manager::{ManagedProcess, ProcessManager, ProcessTarget};
pub use model::{
    NetworkConnection, Pid, Priority, Process, ProcessResource, ProcessStatus, PrivilegesInfo,
    Signal, Transport,
};
pub use monitor::{MonitorId, PerformanceHistory, ProcessMonitor, ResourceKind, TERMINATED};
pub use platform::PlatformAdapter;
pub use toolkit::Toolkit;
