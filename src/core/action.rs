//! Composable, resumable units of work.
//!
//! An [`Action`] is a work function plus an ordered list of sub-actions. A
//! [`WaitAction`] is a leaf that suspends its task until a completion or
//! timeout signal arrives. Once a task owns an action it is installed into an
//! index-linked arena (see `tree`), so that resuming a paused task is a
//! lookup of the suspended node rather than a walk through live pointers.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use ime_task_scheduler::core::{Action, PauseKind, ResultCode, WaitAction};
//!
//! let switch = Action::new(|_ctx| {
//!     // ask the input-method process to start
//!     ResultCode::OK
//! })
//! .then(
//!     WaitAction::for_ime(PauseKind::AwaitingImeStart, "pkg.keyboard", Duration::from_millis(500))
//!         .on_timeout(|_ctx| ResultCode(999)),
//! )
//! .then(Action::new(|ctx| {
//!     ctx.set_payload(b"switched".to_vec());
//!     ResultCode::OK
//! }));
//! assert!(!switch.is_wait());
//! ```

pub(crate) mod tree;

use std::fmt;
use std::time::Duration;

use crate::core::outbox::Outbox;
use crate::core::{CallerInfo, PauseInfo, PauseKind, ResultCode, Task, TaskCode};

/// Work run at most once when its action starts.
pub type WorkFn = Box<dyn FnOnce(&mut ActionContext<'_>) -> ResultCode + Send>;

/// Side effect run once with an action's final result.
pub type ResultHook = Box<dyn FnOnce(ResultCode) + Send>;

pub(crate) enum ActionKind {
    Composite {
        work: Option<WorkFn>,
        children: Vec<Action>,
    },
    Wait(WaitAction),
}

/// A unit of work with ordered sub-actions.
pub struct Action {
    pub(crate) kind: ActionKind,
    pub(crate) affects_parent: bool,
    pub(crate) hook: Option<ResultHook>,
}

impl Action {
    /// An action whose own work is `work`.
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce(&mut ActionContext<'_>) -> ResultCode + Send + 'static,
    {
        Self::composite(Some(Box::new(work)))
    }

    /// An action with no work of its own, only sub-actions.
    #[must_use]
    pub fn empty() -> Self {
        Self::composite(None)
    }

    fn composite(work: Option<WorkFn>) -> Self {
        Self {
            kind: ActionKind::Composite {
                work,
                children: Vec::new(),
            },
            affects_parent: true,
            hook: None,
        }
    }

    /// Queue `child` to run after this action's work and earlier children.
    #[must_use]
    pub fn then(self, child: impl Into<Self>) -> Self {
        let child = child.into();
        match self.kind {
            ActionKind::Composite { work, mut children } => {
                children.push(child);
                Self {
                    kind: ActionKind::Composite { work, children },
                    affects_parent: self.affects_parent,
                    hook: self.hook,
                }
            }
            ActionKind::Wait(wait) => {
                let wait = Self {
                    kind: ActionKind::Wait(wait),
                    affects_parent: self.affects_parent,
                    hook: self.hook,
                };
                Self::empty().then(wait).then(child)
            }
        }
    }

    /// Keep this action's failure from failing its parent.
    #[must_use]
    pub const fn detached(mut self) -> Self {
        self.affects_parent = false;
        self
    }

    /// Run `hook` once with this action's final result.
    #[must_use]
    pub fn on_result<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(ResultCode) + Send + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Whether this action is a wait.
    #[must_use]
    pub const fn is_wait(&self) -> bool {
        matches!(self.kind, ActionKind::Wait(_))
    }
}

impl From<WaitAction> for Action {
    fn from(wait: WaitAction) -> Self {
        Self {
            kind: ActionKind::Wait(wait),
            affects_parent: true,
            hook: None,
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ActionKind::Composite { work, children } => f
                .debug_struct("Action")
                .field("has_work", &work.is_some())
                .field("children", children)
                .field("affects_parent", &self.affects_parent)
                .finish_non_exhaustive(),
            ActionKind::Wait(wait) => f
                .debug_struct("Action")
                .field("wait", wait)
                .field("affects_parent", &self.affects_parent)
                .finish_non_exhaustive(),
        }
    }
}

/// Leaf action that pauses until its completion or timeout id arrives.
///
/// Both ids are minted when the wait starts. Whichever arrives first resolves
/// the wait; any other id is ignored and the wait stays paused.
pub struct WaitAction {
    pub(crate) timeout: Duration,
    pub(crate) target: Option<(PauseKind, String)>,
    pub(crate) on_complete: Option<WorkFn>,
    pub(crate) on_timeout: Option<WorkFn>,
}

impl WaitAction {
    /// A wait bounded by `timeout` that only an explicit completion can end early.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            target: None,
            on_complete: None,
            on_timeout: None,
        }
    }

    /// A wait that `TryResume(kind, caller)` ends when `caller` is `bundle_name`.
    #[must_use]
    pub fn for_ime(kind: PauseKind, bundle_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: Some((kind, bundle_name.into())),
            ..Self::new(timeout)
        }
    }

    /// Result when the completion id arrives. Defaults to [`ResultCode::OK`].
    #[must_use]
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&mut ActionContext<'_>) -> ResultCode + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Result when the timeout id arrives. Defaults to [`ResultCode::WAIT_TIMEOUT`].
    #[must_use]
    pub fn on_timeout<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&mut ActionContext<'_>) -> ResultCode + Send + 'static,
    {
        self.on_timeout = Some(Box::new(callback));
        self
    }

    /// Upper bound on the pause.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for WaitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitAction")
            .field("timeout", &self.timeout)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// What a work function or wait callback can reach while it runs.
pub struct ActionContext<'a> {
    caller: &'a CallerInfo,
    payload: &'a mut Vec<u8>,
    outbox: &'a mut Outbox,
    pended: Vec<Action>,
}

impl<'a> ActionContext<'a> {
    pub(crate) fn new(
        caller: &'a CallerInfo,
        payload: &'a mut Vec<u8>,
        outbox: &'a mut Outbox,
    ) -> Self {
        Self {
            caller,
            payload,
            outbox,
            pended: Vec::new(),
        }
    }

    /// Caller of the task being run.
    #[must_use]
    pub const fn caller(&self) -> &'a CallerInfo {
        self.caller
    }

    /// Replace the response payload.
    pub fn set_payload(&mut self, payload: Vec<u8>) {
        *self.payload = payload;
    }

    /// Response payload built so far.
    pub fn payload_mut(&mut self) -> &mut Vec<u8> {
        self.payload
    }

    /// Add a sub-action to the action that is running.
    ///
    /// From a work function the action joins the back of its own queue. From a
    /// wait callback it runs ahead of the wait's not-yet-started siblings.
    pub fn pend(&mut self, action: impl Into<Action>) {
        self.pended.push(action.into());
    }

    /// [`ActionContext::pend`] for a bare work function.
    pub fn pend_fn<F>(&mut self, work: F)
    where
        F: FnOnce(&mut ActionContext<'_>) -> ResultCode + Send + 'static,
    {
        self.pend(Action::new(work));
    }

    /// Post a follow-up task, admitted exactly as an external post would be.
    ///
    /// Returns the new task's sequence id. It runs after the current pass.
    pub fn post_task(&mut self, task: Task, delay: Duration) -> u64 {
        self.outbox.post(task, delay)
    }

    /// Deliver `resume_id` to the paused task through an inner signal.
    pub fn complete(&mut self, resume_id: u64) {
        self.outbox.signal(TaskCode::ResumeWait, resume_id, Duration::ZERO);
    }

    /// Resume the paused task if it waits for `kind` from `caller`'s bundle.
    ///
    /// Returns whether a resume signal was sent. Non-matching callers are ignored.
    pub fn try_resume(&mut self, kind: PauseKind, caller: &CallerInfo) -> bool {
        let Some(resume_id) = self
            .outbox
            .observed_pause()
            .filter(|pause| pause.matches(kind, caller))
            .map(|pause| pause.resume_id)
        else {
            return false;
        };
        self.complete(resume_id);
        true
    }

    /// Pause of the task this work runs beside, if any.
    #[must_use]
    pub const fn paused_task(&self) -> Option<&PauseInfo> {
        self.outbox.observed_pause()
    }

    pub(crate) fn into_pended(self) -> Vec<Action> {
        self.pended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_then_on_wait_wraps_in_composite() {
        let action = Action::from(WaitAction::new(Duration::from_millis(5))).then(Action::empty());
        assert!(!action.is_wait());
        match action.kind {
            ActionKind::Composite { work, children } => {
                assert!(work.is_none());
                assert_eq!(children.len(), 2);
                assert!(children[0].is_wait());
            }
            ActionKind::Wait(_) => panic!("expected composite"),
        }
    }

    #[test]
    fn test_detached_flag() {
        assert!(Action::empty().affects_parent);
        assert!(!Action::empty().detached().affects_parent);
    }

    #[test]
    fn test_wait_target() {
        let wait = WaitAction::for_ime(PauseKind::AwaitingImeStop, "pkg.a", Duration::from_secs(1));
        assert_eq!(wait.timeout(), Duration::from_secs(1));
        assert_eq!(wait.target, Some((PauseKind::AwaitingImeStop, "pkg.a".to_string())));
    }
}
