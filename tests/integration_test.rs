//! Integration test: config load, inspection, directory search, control.

mod common;

use common::{as_adapter, FakeAdapter, FakeProc};
use procman::{
    command::{CommandExecutor, CommandOutput},
    config::{InspectorConfig, ProcmanConfig},
    controller::ProcessController,
    cpu::CpuUsageTracker,
    directory::ProcessDirectory,
    error::ProcError,
    inspector::ProcessInspector,
    model::{Priority, ProcessStatus, Signal},
    platform, Toolkit,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn inspector_over(fake: &Arc<FakeAdapter>) -> Arc<ProcessInspector> {
    let adapter = as_adapter(fake);
    let tracker = Arc::new(CpuUsageTracker::new(Arc::clone(&adapter)));
    Arc::new(ProcessInspector::new(adapter, tracker))
}

fn sample_table() -> Arc<FakeAdapter> {
    let fake = FakeAdapter::new(4);
    fake.add(1, FakeProc::new("init", 0));
    fake.add(100, FakeProc::new("sshd", 1));
    fake.add(101, FakeProc::new("bash", 100));
    fake.add(102, FakeProc::new("vim", 101));
    fake.add(200, FakeProc::new("sshd", 1));
    fake.add(300, FakeProc::new("postgres", 1));
    fake
}

#[test]
fn config_load_default() {
    let c = ProcmanConfig::load(Path::new("nonexistent.json"));
    assert_eq!(c.manager.max_processes, 20);
    assert_eq!(c.monitor.default_interval_ms, 1000);
    assert!(c.inspector.environment);
}

#[test]
fn config_partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"manager":{"max_processes":3},"log":{"json":true}}"#).unwrap();
    let c = ProcmanConfig::load(&path);
    assert_eq!(c.manager.max_processes, 3);
    assert_eq!(c.manager.terminate_grace_ms, 3000);
    assert!(c.log.json);
    assert_eq!(c.log.level, "info");

    std::fs::write(&path, "{ not json").unwrap();
    assert_eq!(ProcmanConfig::load(&path).manager.max_processes, 20);
}

#[test]
fn config_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");
    let mut c = ProcmanConfig::default();
    c.manager.shell = Some("/bin/bash".into());
    c.save(&path).unwrap();
    assert_eq!(
        ProcmanConfig::load(&path).manager.shell.as_deref(),
        Some("/bin/bash")
    );
}

#[tokio::test]
async fn toolkit_applies_monitor_and_log_sections() {
    let fake = sample_table();
    let mut config = ProcmanConfig::default();
    config.monitor.default_interval_ms = 25;
    config.log.level = "warn".into();
    let toolkit = Toolkit::with_adapter(config, as_adapter(&fake), tokio::runtime::Handle::current());
    assert_eq!(
        toolkit.monitor.config().default_interval(),
        Duration::from_millis(25)
    );
    let _ = toolkit.init_logging();
    assert!(!toolkit.init_logging());
}

#[test]
fn inspect_builds_full_record() {
    let fake = sample_table();
    let inspector = inspector_over(&fake);
    let p = inspector.inspect(101).unwrap();
    assert_eq!(p.pid, 101);
    assert_eq!(p.ppid, 100);
    assert_eq!(p.name, "bash");
    assert_eq!(p.path, "/usr/bin/bash");
    assert_eq!(p.command, "bash");
    assert_eq!(p.username, "tester");
    assert_eq!(p.resources.cpu_usage, 0.0);
    assert_eq!(p.resources.mem_usage, 4096);
    assert_eq!(p.environment.get("HOME").map(String::as_str), Some("/root"));
    assert!(p.privileges.is_some());
}

#[test]
fn denied_fields_are_left_empty() {
    let fake = sample_table();
    fake.guard(300);
    let inspector = inspector_over(&fake);
    let p = inspector.inspect(300).unwrap();
    assert_eq!(p.name, "postgres");
    assert!(p.username.is_empty());
    assert!(p.environment.is_empty());
    assert!(p.privileges.is_none());
}

#[test]
fn transient_read_is_retried_once() {
    let fake = sample_table();
    let inspector = inspector_over(&fake);

    fake.flake(100, 1);
    assert_eq!(inspector.status(100).unwrap(), ProcessStatus::Sleeping);

    fake.flake(100, 2);
    assert!(matches!(inspector.status(100), Err(ProcError::NotFound(100))));
}

#[test]
fn missing_process_is_not_found() {
    let fake = sample_table();
    let inspector = inspector_over(&fake);
    assert!(matches!(inspector.inspect(9999), Err(ProcError::NotFound(9999))));
    assert!(inspector.parent_pid(9999).unwrap_err().is_absent());
}

#[test]
fn optional_queries_can_be_disabled() {
    let fake = sample_table();
    let adapter = as_adapter(&fake);
    let tracker = Arc::new(CpuUsageTracker::new(Arc::clone(&adapter)));
    let inspector = ProcessInspector::with_options(adapter, tracker, InspectorConfig::minimal());
    let p = inspector.inspect(102).unwrap();
    assert!(p.environment.is_empty());
    assert!(p.privileges.is_none());
    assert!(p.username.is_empty());
    assert_eq!(fake.privilege_reads(), 0);
}

#[test]
fn default_options_resolve_owner_once() {
    let fake = sample_table();
    let inspector = inspector_over(&fake);
    let p = inspector.inspect(102).unwrap();
    assert_eq!(p.username, "tester");
    assert_eq!(p.privileges.unwrap().uid, Some(1000));
    assert_eq!(fake.privilege_reads(), 1);
}

#[test]
fn process_tree_follows_parent_links() {
    let fake = sample_table();
    let inspector = inspector_over(&fake);
    let tree = inspector.process_tree(1).unwrap();
    assert_eq!(tree.len(), 6);
    let sshd = tree.children.iter().find(|c| c.pid == 100).unwrap();
    assert_eq!(sshd.children[0].pid, 101);
    assert_eq!(sshd.children[0].children[0].name, "vim");
    assert_eq!(inspector.children(1), vec![100, 200, 300]);
}

#[test]
fn directory_searches_by_name_and_substring() {
    let fake = sample_table();
    let directory = ProcessDirectory::new(inspector_over(&fake));
    assert_eq!(directory.enumerate_all().len(), 6);

    let sshd: Vec<u32> = directory.find_by_name("sshd").iter().map(|p| p.pid).collect();
    assert_eq!(sshd, vec![100, 200]);
    assert!(directory.find_by_name("ssh").is_empty());

    let fuzzy = directory.find_by_substring("ss");
    assert_eq!(fuzzy.len(), 2);
    assert!(directory.is_running("postgres"));
    assert!(!directory.is_running("nginx"));
    assert_eq!(directory.pids_by_name("vim"), vec![102]);

    let children_of_one = directory.find_where(|p| p.ppid == 1);
    assert_eq!(children_of_one.len(), 3);
}

struct CannedListing;

impl CommandExecutor for CannedListing {
    fn execute(&self, command: &str) -> std::io::Result<CommandOutput> {
        let stdout = if cfg!(windows) {
            "\"node.exe\",\"41\",\"Console\",\"1\",\"9 K\"\r\n\"cron.exe\",\"42\",\"Console\",\"1\",\"9 K\"\r\n"
        } else {
            "   41 node\n   42 cron\ngarbage line\n"
        };
        assert!(!command.is_empty());
        Ok(CommandOutput {
            stdout: stdout.to_string(),
            status: 0,
        })
    }
}

#[test]
fn empty_native_listing_falls_back_to_executor() {
    let fake = FakeAdapter::new(1);
    let directory = ProcessDirectory::new(inspector_over(&fake)).with_executor(Arc::new(CannedListing));
    let listed = directory.enumerate_all();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].0, 41);

    // listed by the tool but not inspectable natively: dropped, not an error
    assert!(directory.find_by_command_pattern("node").is_empty());
}

#[test]
fn controller_reports_missing_targets_as_false() {
    let fake = sample_table();
    let controller = ProcessController::new(as_adapter(&fake));
    assert!(!controller.terminate_by_pid(4242, Signal::TERM).unwrap());
    assert!(!controller.suspend(4242).unwrap());
    assert!(!controller.set_priority(4242, Priority::Low).unwrap());
}

#[test]
fn controller_mutates_through_adapter() {
    let fake = sample_table();
    let controller = ProcessController::new(as_adapter(&fake));
    assert!(controller.set_priority(300, Priority::High).unwrap());
    assert_eq!(controller.priority(300).unwrap(), Priority::High);

    assert!(controller.suspend(102).unwrap());
    assert!(controller.resume(102).unwrap());

    assert!(matches!(
        controller.set_affinity(300, &[0]),
        Err(ProcError::PlatformUnsupported(_))
    ));
    assert!(matches!(
        controller.set_affinity(300, &[]),
        Err(ProcError::InvalidArgument(_))
    ));
    assert!(controller.set_memory_limit(300, 1 << 30).unwrap_err().is_unsupported());
}

#[test]
fn terminate_by_name_survives_partial_failure() {
    let fake = sample_table();
    fake.guard(100);
    let controller = ProcessController::new(as_adapter(&fake));
    assert!(controller.terminate_by_name("sshd", Signal::TERM));
    let left = fake.pids_named("sshd");
    assert_eq!(left, vec![100]);

    assert!(!controller.terminate_by_name("sshd", Signal::TERM));
    assert!(!controller.terminate_by_name("nginx", Signal::TERM));
}

#[test]
fn permission_denied_signal_is_an_error() {
    let fake = sample_table();
    fake.guard(300);
    let controller = ProcessController::new(as_adapter(&fake));
    let err = controller.terminate_by_pid(300, Signal::KILL).unwrap_err();
    assert!(err.is_permission_denied());
}

#[test]
fn every_enumerated_pid_inspects_or_is_gone() {
    let adapter = platform::native();
    let tracker = Arc::new(CpuUsageTracker::new(Arc::clone(&adapter)));
    let inspector = ProcessInspector::new(Arc::clone(&adapter), tracker);
    for (pid, _) in adapter.enumerate().into_iter().take(64) {
        match inspector.inspect(pid) {
            Ok(p) => assert_eq!(p.pid, pid),
            Err(e) => assert!(matches!(e, ProcError::NotFound(_)), "pid {pid}: {e}"),
        }
    }
}

#[test]
fn inspect_self_on_native_adapter() {
    let adapter = platform::native();
    let tracker = Arc::new(CpuUsageTracker::new(Arc::clone(&adapter)));
    let inspector = ProcessInspector::new(adapter, tracker);
    let me = inspector.inspect_self().unwrap();
    assert_eq!(me.pid, std::process::id());
    assert!(!me.name.is_empty());
    assert!(me.status.is_alive());
    assert!(me.resources.mem_usage > 0);
    assert!(inspector.tracker().is_tracked(me.pid));
}

#[cfg(unix)]
#[test]
fn spawn_and_terminate_real_process() {
    let controller = ProcessController::new(platform::native());
    let mut spawned = controller
        .spawn("sleep 30", &procman::SpawnOptions::default())
        .unwrap();
    assert!(controller.terminate_by_pid(spawned.pid, Signal::TERM).unwrap());
    let status = spawned.child.wait().unwrap();
    assert!(!status.success());
}

#[test]
fn scheduling_extras_are_unsupported_on_fake() {
    let fake = sample_table();
    let controller = ProcessController::new(as_adapter(&fake));
    assert!(matches!(
        controller.io_priority(102),
        Err(ProcError::PlatformUnsupported(_))
    ));
    assert!(matches!(
        controller.set_io_priority(102, 8),
        Err(ProcError::InvalidArgument(_))
    ));
    let inspector = inspector_over(&fake);
    assert!(matches!(
        inspector.network_connections(102),
        Err(ProcError::PlatformUnsupported(_))
    ));
}

#[cfg(target_os = "linux")]
#[test]
fn listening_socket_shows_up_for_self() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let local = listener.local_addr().unwrap();
    let adapter = platform::native();
    let tracker = Arc::new(CpuUsageTracker::new(Arc::clone(&adapter)));
    let inspector = ProcessInspector::new(adapter, tracker);
    let connections = inspector.network_connections(std::process::id()).unwrap();
    assert!(connections.iter().any(|c| c.local == local && c.state == "LISTEN"));
    assert!(matches!(
        inspector.network_connections(u32::MAX - 1),
        Err(ProcError::NotFound(_))
    ));
}

#[cfg(target_os = "linux")]
#[test]
fn io_priority_of_spawned_child() {
    let controller = ProcessController::new(platform::native());
    let mut spawned = controller
        .spawn("sleep 30", &procman::SpawnOptions::default())
        .unwrap();
    assert!(controller.set_io_priority(spawned.pid, 7).unwrap());
    assert_eq!(controller.io_priority(spawned.pid).unwrap(), 7);
    controller.terminate_by_pid(spawned.pid, Signal::KILL).unwrap();
    spawned.child.wait().unwrap();
    assert!(!controller.set_io_priority(spawned.pid, 7).unwrap());
}

#[cfg(unix)]
#[test]
fn spawn_as_current_user() {
    let adapter = platform::native();
    let me = adapter.privileges(std::process::id()).unwrap();
    // SAFETY: getgid has no preconditions.
    let gid = unsafe { libc::getgid() };
    let controller = ProcessController::new(adapter);
    assert!(matches!(
        controller.spawn_as_user("true", "no-such-account-here", &procman::SpawnOptions::default()),
        Err(ProcError::InvalidArgument(_))
    ));
    if me.username.is_empty() || !primary_gid_matches(&me.username, gid) {
        // no passwd entry for this uid, or running under another group
        return;
    }
    let options = procman::SpawnOptions {
        capture_output: true,
        ..Default::default()
    };
    let spawned = controller.spawn_as_user("id -u", &me.username, &options).unwrap();
    let output = spawned.child.wait_with_output().unwrap();
    let uid: u32 = String::from_utf8_lossy(&output.stdout).trim().parse().unwrap();
    assert_eq!(Some(uid), me.uid);
}

#[cfg(unix)]
fn primary_gid_matches(user: &str, gid: u32) -> bool {
    std::process::Command::new("id")
        .args(["-g", user])
        .output()
        .ok()
        .and_then(|o| String::from_utf8_lossy(&o.stdout).trim().parse::<u32>().ok())
        == Some(gid)
}

#[test]
fn spawn_reports_failure_kinds() {
    let controller = ProcessController::new(platform::native());
    assert!(matches!(
        controller.spawn("   ", &procman::SpawnOptions::default()),
        Err(ProcError::InvalidArgument(_))
    ));
    let options = procman::SpawnOptions {
        shell: Some("/definitely/not/a/shell".into()),
        ..Default::default()
    };
    assert!(matches!(
        controller.spawn("true", &options),
        Err(ProcError::SpawnFailed { .. })
    ));
}
