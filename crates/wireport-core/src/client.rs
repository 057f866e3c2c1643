//! Shared pieces of the two kernel client boundaries.

use std::time::{Duration, Instant};

use thiserror::Error;

/// Per-call context handed to every client method.
///
/// Carries an optional deadline and an operation label for log fields.
/// Clients backed by inherently synchronous transports may ignore the
/// deadline.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    operation: &'static str,
}

impl CallContext {
    /// A context with no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { deadline: Instant::now().checked_add(timeout), operation: "" }
    }

    /// Sets the operation label.
    #[must_use]
    pub fn for_operation(mut self, operation: &'static str) -> Self {
        self.operation = operation;
        self
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, if any. Zero once expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns true once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// The operation label, empty if unset.
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

/// Errors reported by tunnel and link clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The named device or link does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// An I/O error talking to the kernel or spawning a tool.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An external tool exited unsuccessfully.
    #[error("`{command}` exited with status {status}: {stderr}")]
    Command {
        /// The command line that was run.
        command: String,
        /// Exit status, -1 if killed by a signal.
        status: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// Kernel or tool output could not be interpreted.
    #[error("failed to parse {what}: {reason}")]
    Parse {
        /// What was being parsed.
        what: String,
        /// Why parsing failed.
        reason: String,
    },

    /// The kernel rejected the request.
    #[error("kernel rejected request: {0}")]
    Kernel(String),

    /// The operation is not available on this platform or build.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ClientError {
    /// Returns true if the error reports an absent device or link.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub(crate) fn parse(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse { what: what.into(), reason: reason.to_string() }
    }
}
