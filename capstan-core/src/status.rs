//! Transport-level status for RPC outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of an RPC as seen by the transport.
///
/// A status of [`RpcStatus::Ok`] means the remote worker produced a reply;
/// the reply body may still describe an application-level failure. The
/// non-ok variants classify why no usable reply was produced, which drives
/// the submitter's retry and grace-period logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcStatus {
    /// The call completed and a reply was received.
    Ok,
    /// The transport failed: connection refused, reset, or timed out.
    IoError {
        /// Human-readable failure detail.
        message: String,
    },
    /// The remote scheduler cancelled the work before it executed.
    SchedulingCancelled {
        /// Human-readable cancellation detail.
        message: String,
    },
    /// Actor creation ran but the constructor itself raised an error.
    CreationTaskError {
        /// The constructor error, rendered as a string.
        message: String,
    },
}

impl RpcStatus {
    /// Construct an I/O error status.
    pub fn io_error(message: impl Into<String>) -> Self {
        Self::IoError {
            message: message.into(),
        }
    }

    /// Construct a scheduling-cancelled status.
    pub fn scheduling_cancelled(message: impl Into<String>) -> Self {
        Self::SchedulingCancelled {
            message: message.into(),
        }
    }

    /// Construct a creation-task-error status.
    pub fn creation_task_error(message: impl Into<String>) -> Self {
        Self::CreationTaskError {
            message: message.into(),
        }
    }

    /// Whether the call completed with a reply.
    pub fn is_ok(&self) -> bool {
        matches!(self, RpcStatus::Ok)
    }

    /// Whether the remote scheduler cancelled the work.
    pub fn is_scheduling_cancelled(&self) -> bool {
        matches!(self, RpcStatus::SchedulingCancelled { .. })
    }

    /// Whether actor creation failed inside the constructor.
    pub fn is_creation_task_error(&self) -> bool {
        matches!(self, RpcStatus::CreationTaskError { .. })
    }
}

impl fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcStatus::Ok => write!(f, "ok"),
            RpcStatus::IoError { message } => write!(f, "io error: {}", message),
            RpcStatus::SchedulingCancelled { message } => {
                write!(f, "scheduling cancelled: {}", message)
            }
            RpcStatus::CreationTaskError { message } => {
                write!(f, "creation task error: {}", message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(RpcStatus::Ok.is_ok());
        assert!(!RpcStatus::io_error("boom").is_ok());
        assert!(RpcStatus::scheduling_cancelled("drained").is_scheduling_cancelled());
        assert!(RpcStatus::creation_task_error("__init__ raised").is_creation_task_error());
    }

    #[test]
    fn test_display_carries_message() {
        let status = RpcStatus::io_error("connection reset");
        assert_eq!(status.to_string(), "io error: connection reset");
    }
}
