//! Caller identity and pause metadata.

use serde::{Deserialize, Serialize};

use crate::core::RequestId;

/// Identity of whoever issued a request, captured at the IPC boundary and
/// carried unchanged for the lifetime of the task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerInfo {
    /// Correlation id echoed back in the response.
    pub request_id: RequestId,
    /// Calling process id.
    pub pid: i32,
    /// Calling uid.
    pub uid: i32,
    /// User (account) the caller runs under.
    pub user_id: i32,
    /// Security token of the caller.
    pub token_id: u64,
    /// Bundle (package) name of the caller.
    pub bundle_name: String,
}

impl CallerInfo {
    /// Create a caller identity from a process id and bundle name.
    #[must_use]
    pub fn new(pid: i32, bundle_name: impl Into<String>) -> Self {
        Self {
            pid,
            bundle_name: bundle_name.into(),
            ..Self::default()
        }
    }

    /// Set the request correlation id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    /// Set the uid and user id.
    #[must_use]
    pub fn with_user(mut self, uid: i32, user_id: i32) -> Self {
        self.uid = uid;
        self.user_id = user_id;
        self
    }

    /// Set the security token id.
    #[must_use]
    pub fn with_token_id(mut self, token_id: u64) -> Self {
        self.token_id = token_id;
        self
    }
}

/// Why a task is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseKind {
    /// Waiting for an input-method process to finish starting.
    AwaitingImeStart,
    /// Waiting for an input-method process to stop.
    AwaitingImeStop,
}

/// What a paused task is waiting for and who may resume it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PauseInfo {
    /// Reason for the pause.
    pub kind: PauseKind,
    /// Bundle whose report ends the pause.
    pub target_bundle_name: String,
    /// Only id that completes this particular wait.
    pub resume_id: u64,
}

impl PauseInfo {
    /// Whether `caller` reporting `kind` is the event this pause waits for.
    #[must_use]
    pub fn matches(&self, kind: PauseKind, caller: &CallerInfo) -> bool {
        self.kind == kind && self.target_bundle_name == caller.bundle_name
    }
}
