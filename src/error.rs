//! Error types of the task core.
//!
//! Task-control operations return [`TaskResult<T>`], whose error variants are
//! part of the contract and can be matched on. Collaborator plumbing (timer
//! slots and other platform glue) uses [`TinyResult<T>`], an alias for
//! `anyhow::Result<T>`, and is only ever logged.
//!
//! ## Usage Examples
//!
//! Creating collaborator errors:
//! ```ignore
//! anyhow::bail!("timer list full ({} slots)", MAX_TIMERS);
//! ```
//!
//! Ensuring conditions:
//! ```ignore
//! anyhow::ensure!(ticks > 0, "timer armed with zero ticks");
//! ```

use core::fmt;

/// Result type alias using anyhow::Error.
///
/// This provides flexible error handling with context and error chaining.
pub type TinyResult<T> = anyhow::Result<T>;

/// Result type of the task-control API.
pub type TaskResult<T> = Result<T, TaskError>;

/// `ETIMEDOUT` as used by the wake-reason flag.
pub const ETIMEDOUT: isize = 110;

/// Recoverable errors of the task-control API.
///
/// Broken scheduler invariants are not represented here; they panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// Zero or foreign input (zero sleep ticks, task of another manager).
    InvalidArgument,
    /// Priority outside `0..MAX_PRIORITY`.
    InvalidPriority,
    /// No page left for the control header and stack.
    OutOfMemory,
    /// Every task identifier is in use.
    NoIdentifierAvailable,
    /// The task's status forbids the operation.
    InvalidState,
    /// The task is already READY or RUNNING.
    AlreadyReady,
    /// A timed wait expired before the task was woken.
    TimedOut,
    /// The task has no timer (its timer failed to initialize).
    TimerUnavailable,
}

impl TaskError {
    /// Negative errno equivalent, for C-facing shims.
    pub const fn errno(self) -> isize {
        match self {
            Self::InvalidArgument
            | Self::InvalidPriority
            | Self::InvalidState
            | Self::AlreadyReady => -22, // EINVAL
            Self::OutOfMemory => -12, // ENOMEM
            Self::NoIdentifierAvailable => -11, // EAGAIN
            Self::TimedOut => -ETIMEDOUT,
            Self::TimerUnavailable => -19, // ENODEV
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidArgument => "invalid argument",
            Self::InvalidPriority => "priority out of range",
            Self::OutOfMemory => "out of memory",
            Self::NoIdentifierAvailable => "no task identifier available",
            Self::InvalidState => "operation not allowed in the task's state",
            Self::AlreadyReady => "task is already in a ready state",
            Self::TimedOut => "timed out",
            Self::TimerUnavailable => "task has no timer",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for TaskError {}
