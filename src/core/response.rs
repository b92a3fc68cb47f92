//! Result codes and the response-delivery capability.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;

/// Correlation id the IPC layer attaches to a request.
pub type RequestId = u64;

/// Outcome code delivered with every task response.
///
/// Codes are plain integers so that work functions can report whatever their
/// transport understands; the scheduler only distinguishes [`ResultCode::OK`]
/// from everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultCode(pub i32);

impl ResultCode {
    /// Success.
    pub const OK: Self = Self(0);
    /// The task was destroyed before it produced a response.
    pub const TASK_TIMEOUT: Self = Self(801);
    /// A wait resolved through its timeout and no timeout callback was set.
    pub const WAIT_TIMEOUT: Self = Self(802);
    /// The task came from the awaited caller but is not safe to run during the wait.
    pub const TASK_DROPPED: Self = Self(803);
    /// The task was driven from a state that does not allow the operation.
    pub const TASK_ILLEGAL: Self = Self(804);

    /// Whether this is [`ResultCode::OK`].
    #[must_use]
    pub const fn is_ok(self) -> bool {
        self.0 == Self::OK.0
    }

    /// Raw integer value.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl Default for ResultCode {
    fn default() -> Self {
        Self::OK
    }
}

impl From<i32> for ResultCode {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::OK => write!(f, "ok"),
            Self::TASK_TIMEOUT => write!(f, "task timeout"),
            Self::WAIT_TIMEOUT => write!(f, "wait timeout"),
            Self::TASK_DROPPED => write!(f, "task dropped"),
            Self::TASK_ILLEGAL => write!(f, "task illegal"),
            Self(code) => write!(f, "code {code}"),
        }
    }
}

/// A delivered response, as recorded by in-process transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Request the response answers.
    pub request_id: RequestId,
    /// Outcome code.
    pub code: ResultCode,
    /// Opaque payload; the scheduler never inspects it.
    pub payload: Vec<u8>,
}

/// Capability through which a finished task answers its caller.
///
/// Each concrete transport (remote client channel, input-method agent channel,
/// in-process recorder) implements this one contract.
pub trait ResponseChannel: Send + Sync {
    /// Deliver a terminal outcome for `request_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Delivery`] if the transport cannot accept it.
    fn deliver(
        &self,
        request_id: RequestId,
        code: ResultCode,
        payload: Vec<u8>,
    ) -> Result<(), SchedulerError>;

    /// Whether the remote end is still reachable.
    fn is_alive(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_ok() {
        assert!(ResultCode::OK.is_ok());
        assert!(!ResultCode::TASK_TIMEOUT.is_ok());
        assert!(!ResultCode(999).is_ok());
        assert_eq!(ResultCode::default(), ResultCode::OK);
    }

    #[test]
    fn test_result_code_display() {
        assert_eq!(ResultCode::OK.to_string(), "ok");
        assert_eq!(ResultCode::WAIT_TIMEOUT.to_string(), "wait timeout");
        assert_eq!(ResultCode(999).to_string(), "code 999");
    }

    #[test]
    fn test_result_code_serde_transparent() {
        let json = serde_json::to_string(&ResultCode(42)).unwrap();
        assert_eq!(json, "42");
        let code: ResultCode = serde_json::from_str("803").unwrap();
        assert_eq!(code, ResultCode::TASK_DROPPED);
    }
}
