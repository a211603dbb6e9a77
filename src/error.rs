//! Error taxonomy shared by every component.
//!
//! `NotFound` and `PermissionDenied` are ordinary outcomes of querying racy
//! external state and are returned as values; `SpawnFailed` and
//! `ResourceExhausted` mean a requested creation categorically could not happen.

use crate::model::Pid;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcError {
    #[error("process {0} not found")]
    NotFound(Pid),

    #[error("permission denied for process {pid}: {operation}")]
    PermissionDenied { pid: Pid, operation: &'static str },

    #[error("{0} is not supported on this platform")]
    PlatformUnsupported(&'static str),

    #[error("failed to spawn '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("process limit reached ({limit} managed processes)")]
    ResourceExhausted { limit: usize },

    #[error("data for process {0} vanished mid-read")]
    TransientRead(Pid),

    #[error("failed to deliver signal {signal} to process {pid}: {reason}")]
    SignalFailed { pid: Pid, signal: i32, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Copyable discriminant of [`ProcError`] for branching without matching payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    PlatformUnsupported,
    SpawnFailed,
    ResourceExhausted,
    TransientRead,
    SignalFailed,
    InvalidArgument,
    Io,
}

impl ProcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcError::NotFound(_) => ErrorKind::NotFound,
            ProcError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            ProcError::PlatformUnsupported(_) => ErrorKind::PlatformUnsupported,
            ProcError::SpawnFailed { .. } => ErrorKind::SpawnFailed,
            ProcError::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            ProcError::TransientRead(_) => ErrorKind::TransientRead,
            ProcError::SignalFailed { .. } => ErrorKind::SignalFailed,
            ProcError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ProcError::Io(_) => ErrorKind::Io,
        }
    }

    /// True when the process is gone (or was mid-exit while being read).
    pub fn is_absent(&self) -> bool {
        matches!(self, ProcError::NotFound(_) | ProcError::TransientRead(_))
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ProcError::PermissionDenied { .. })
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, ProcError::PlatformUnsupported(_))
    }

    pub(crate) fn denied(pid: Pid, operation: &'static str) -> Self {
        ProcError::PermissionDenied { pid, operation }
    }
}

pub type Result<T> = std::result::Result<T, ProcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        assert_eq!(ProcError::NotFound(4).kind(), ErrorKind::NotFound);
        assert_eq!(
            ProcError::ResourceExhausted { limit: 2 }.kind(),
            ErrorKind::ResourceExhausted
        );
        assert_eq!(
            ProcError::PlatformUnsupported("affinity").kind(),
            ErrorKind::PlatformUnsupported
        );
    }

    #[test]
    fn absence_covers_transient_reads() {
        assert!(ProcError::NotFound(1).is_absent());
        assert!(ProcError::TransientRead(1).is_absent());
        assert!(!ProcError::denied(1, "environment").is_absent());
    }

    #[test]
    fn display_names_the_pid() {
        let e = ProcError::denied(42, "set priority");
        assert_eq!(e.to_string(), "permission denied for process 42: set priority");
    }
}
