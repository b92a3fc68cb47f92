//! Error types for scheduler admission and control operations.
//!
//! Only admission failures surface as `Err`. Execution, timeout and drop
//! outcomes travel to the caller as a [`ResultCode`](crate::core::ResultCode)
//! inside the task's response.

use thiserror::Error;

/// Errors returned synchronously to whoever submits work or registers a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// No task was supplied.
    #[error("null task")]
    NullTask,
    /// The serial worker could not accept the task.
    #[error("post failed: {0}")]
    PostFailed(String),
    /// There is no running or paused task to pend work onto.
    #[error("pend failed: {0}")]
    PendFailed(String),
    /// The caller already has as many requests in flight as it is allowed.
    #[error("too many requests: pid {pid} has {in_flight} in flight")]
    TooManyRequests {
        /// Calling process.
        pid: i32,
        /// Requests currently in flight for that process.
        in_flight: u32,
    },
    /// No response channel is registered for the process.
    #[error("no response channel registered for pid {0}")]
    NotRegistered(i32),
    /// A different, still-live channel is already registered for the process.
    #[error("pid {0} already has a live response channel")]
    ChannelConflict(i32),
    /// A response channel refused a delivery.
    #[error("delivery failed: {0}")]
    Delivery(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The serial worker could not be started or did not answer.
    #[error("worker error: {0}")]
    Worker(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
