//! Command-execution collaborator: runs an external listing tool and parses
//! its untrusted text output. Used where native enumeration comes back empty.

use crate::model::Pid;
use std::process::Command;

/// Captured result of running a command through the host shell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

pub trait CommandExecutor: Send + Sync {
    fn execute(&self, command: &str) -> std::io::Result<CommandOutput>;
}

/// Runs commands through `sh -c` (or `cmd /C` on Windows).
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor {
    shell: Option<String>,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: Some(shell.into()),
        }
    }

    /// Build (without spawning) the shell invocation for `command`.
    pub fn command(&self, command: &str) -> Command {
        shell_command(self.shell.as_deref(), command)
    }
}

pub(crate) fn shell_command(shell: Option<&str>, command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new(shell.unwrap_or("cmd"));
        cmd.args(["/C", command]);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new(shell.unwrap_or("/bin/sh"));
        cmd.args(["-c", command]);
        cmd
    }
}

impl CommandExecutor for ShellExecutor {
    fn execute(&self, command: &str) -> std::io::Result<CommandOutput> {
        let output = self.command(command).output()?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            status: output.status.code().unwrap_or(-1),
        })
    }
}

/// Command listing every process as `(pid, name)` on this host.
pub fn listing_command() -> &'static str {
    if cfg!(windows) {
        "tasklist /FO CSV /NH"
    } else {
        "ps -eo pid=,comm="
    }
}

/// Command listing processes whose full command line contains `pattern`.
pub fn pattern_command(pattern: &str) -> String {
    if cfg!(windows) {
        format!("tasklist /FO CSV /NH /FI \"IMAGENAME eq {}*\"", pattern.replace('"', ""))
    } else {
        format!("pgrep -fl -- '{}'", pattern.replace('\'', "'\\''"))
    }
}

/// Parse `pid name` lines (`ps -eo pid=,comm=`, `pgrep -l`). Malformed lines are skipped.
pub fn parse_pid_name_lines(text: &str) -> Vec<(Pid, String)> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            let (pid, name) = line.split_once(char::is_whitespace)?;
            let pid = pid.parse::<Pid>().ok()?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            // ps prints the executable path for comm on some systems
            let name = name.rsplit('/').next().unwrap_or(name);
            Some((pid, name.to_string()))
        })
        .collect()
}

/// Parse `tasklist /FO CSV /NH` rows: `"name","pid","session","#","mem"`.
pub fn parse_tasklist_csv(text: &str) -> Vec<(Pid, String)> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.trim().split("\",\"");
            let name = fields.next()?.trim_start_matches('"');
            let pid = fields.next()?.trim_matches('"').parse::<Pid>().ok()?;
            if name.is_empty() {
                return None;
            }
            Some((pid, name.to_string()))
        })
        .collect()
}

/// Parse listing output in whichever format this host's listing command emits.
pub fn parse_listing(text: &str) -> Vec<(Pid, String)> {
    if cfg!(windows) {
        parse_tasklist_csv(text)
    } else {
        parse_pid_name_lines(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ps_output_skips_garbage() {
        let text = "    1 systemd\n  422 /usr/sbin/sshd\nnot-a-pid foo\n  9\n 1001 my tool\n";
        assert_eq!(
            parse_pid_name_lines(text),
            vec![
                (1, "systemd".to_string()),
                (422, "sshd".to_string()),
                (1001, "my tool".to_string()),
            ]
        );
    }

    #[test]
    fn tasklist_csv_rows() {
        let text = "\"System Idle Process\",\"0\",\"Services\",\"0\",\"8 K\"\r\n\
                    \"explorer.exe\",\"4242\",\"Console\",\"1\",\"90,000 K\"\r\n\
                    INFO: No tasks are running\r\n";
        assert_eq!(
            parse_tasklist_csv(text),
            vec![
                (0, "System Idle Process".to_string()),
                (4242, "explorer.exe".to_string()),
            ]
        );
    }

    #[test]
    fn pattern_is_quoted_for_the_shell() {
        if cfg!(windows) {
            return;
        }
        assert_eq!(pattern_command("it's"), "pgrep -fl -- 'it'\\''s'");
    }

    #[cfg(unix)]
    #[test]
    fn shell_executor_captures_output_and_status() {
        let out = ShellExecutor::new().execute("echo hello; exit 3").unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.status, 3);
        assert!(!out.success());
    }
}
