//! Structured logging: tracing subscriber setup.

mod format;

pub use format::StructuredLogger;
