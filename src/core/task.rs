//! The schedulable unit: caller identity bound to an action tree.
//!
//! A task answers its caller exactly once. Completion delivers the tree's
//! result; destruction without a response (priority drop, shutdown) delivers
//! [`ResultCode::TASK_TIMEOUT`] first.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::action::tree::{ActionTree, Env, Step};
use crate::core::outbox::Outbox;
use crate::core::{
    Action, CallerInfo, PauseInfo, RequesterManager, ResponseChannel, ResultCode,
    SchedulerError, TaskClass, TaskCode,
};
use crate::util::SeqGenerator;

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Built or queued, not started.
    Idle,
    /// Its action tree is executing.
    Running,
    /// Its action tree is suspended in a wait.
    Paused,
    /// Finished and answered.
    Completed,
}

/// The registration a task was counted against.
struct Admission {
    requesters: Arc<RequesterManager>,
    generation: Option<u64>,
}

/// A unit of work with a priority class, a caller and a response channel.
pub struct Task {
    seq_id: u64,
    code: TaskCode,
    caller: CallerInfo,
    tree: Option<ActionTree>,
    channel: Option<Arc<dyn ResponseChannel>>,
    admission: Option<Admission>,
    state: TaskState,
    payload: Vec<u8>,
    responded: bool,
    pause_info: Option<PauseInfo>,
    resume_id: Option<u64>,
}

impl Task {
    /// Build a task that runs `action` on behalf of `caller`.
    pub fn new(code: TaskCode, caller: CallerInfo, action: impl Into<Action>) -> Self {
        Self {
            seq_id: 0,
            code,
            caller,
            tree: Some(ActionTree::new(action.into())),
            channel: None,
            admission: None,
            state: TaskState::Idle,
            payload: Vec::new(),
            responded: false,
            pause_info: None,
            resume_id: None,
        }
    }

    /// Build a resume or timeout signal carrying `resume_id`.
    #[must_use]
    pub fn inner(code: TaskCode, resume_id: u64) -> Self {
        debug_assert_eq!(code.class(), TaskClass::Inner);
        Self {
            seq_id: resume_id,
            code,
            caller: CallerInfo::default(),
            tree: None,
            channel: None,
            admission: None,
            state: TaskState::Idle,
            payload: Vec::new(),
            responded: true,
            pause_info: None,
            resume_id: None,
        }
    }

    /// Attach the channel the response is delivered through.
    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn ResponseChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Sequence id: minted on post, or the carried resume id for signals.
    #[must_use]
    pub const fn seq_id(&self) -> u64 {
        self.seq_id
    }

    /// Task code.
    #[must_use]
    pub const fn code(&self) -> TaskCode {
        self.code
    }

    /// Priority class derived from the code.
    #[must_use]
    pub fn class(&self) -> TaskClass {
        self.code.class()
    }

    /// Who asked for this task.
    #[must_use]
    pub const fn caller(&self) -> &CallerInfo {
        &self.caller
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    /// Whether the task is suspended in a wait.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state == TaskState::Paused
    }

    /// Why the task is paused, if its current wait names a target.
    #[must_use]
    pub const fn pause_info(&self) -> Option<&PauseInfo> {
        self.pause_info.as_ref()
    }

    /// Id that completes the current wait, while paused.
    #[must_use]
    pub const fn resume_id(&self) -> Option<u64> {
        self.resume_id
    }

    /// Give the task its sequence id and count it against its caller.
    pub(crate) fn admit(&mut self, seq: &SeqGenerator, requesters: &Arc<RequesterManager>) {
        if self.seq_id == 0 {
            self.seq_id = seq.next_id();
        }
        if self.admission.is_none() {
            self.admission = Some(Admission {
                generation: requesters.task_in(self.caller.pid),
                requesters: Arc::clone(requesters),
            });
        }
    }

    /// Run the tree from the start. Only valid from [`TaskState::Idle`].
    pub(crate) fn execute(&mut self, outbox: &mut Outbox) -> TaskState {
        if self.state != TaskState::Idle {
            warn!(task_id = self.seq_id, state = ?self.state, "execute from non-idle state ignored");
            return self.state;
        }
        let Some(tree) = self.tree.as_mut() else {
            self.state = TaskState::Completed;
            return self.state;
        };
        debug!(task_id = self.seq_id, code = ?self.code, "executing task");
        self.state = TaskState::Running;
        outbox.take_pause_request();
        let step = {
            let mut env = Env {
                caller: &self.caller,
                payload: &mut self.payload,
                outbox: &mut *outbox,
            };
            tree.execute(&mut env)
        };
        self.settle(step, outbox)
    }

    /// Deliver `resume_id` to the suspended tree. Only valid from [`TaskState::Paused`].
    pub(crate) fn resume(&mut self, resume_id: u64, outbox: &mut Outbox) -> TaskState {
        if self.state != TaskState::Paused {
            debug!(task_id = self.seq_id, resume_id, "resume on task that is not paused");
            return self.state;
        }
        let Some(tree) = self.tree.as_mut() else {
            return self.state;
        };
        self.state = TaskState::Running;
        outbox.take_pause_request();
        let step = {
            let mut env = Env {
                caller: &self.caller,
                payload: &mut self.payload,
                outbox: &mut *outbox,
            };
            tree.resume(resume_id, &mut env)
        };
        self.settle(step, outbox)
    }

    /// Let a signal task act on this one. Non-signal tasks are ignored.
    pub(crate) fn on_task(&mut self, inner: &Self, outbox: &mut Outbox) -> TaskState {
        if inner.class() != TaskClass::Inner {
            return self.state;
        }
        self.resume(inner.seq_id, outbox)
    }

    /// Append work to whichever action is active in the tree.
    pub(crate) fn pend(&mut self, action: Action) -> Result<(), SchedulerError> {
        if !matches!(self.state, TaskState::Running | TaskState::Paused) {
            return Err(SchedulerError::PendFailed(format!(
                "task {} is {:?}",
                self.seq_id, self.state
            )));
        }
        let Some(tree) = self.tree.as_mut() else {
            return Err(SchedulerError::PendFailed(format!(
                "task {} has no actions",
                self.seq_id
            )));
        };
        tree.pend(action);
        Ok(())
    }

    /// Answer with `code` now and mark the task finished.
    pub(crate) fn fail(mut self, code: ResultCode) {
        self.state = TaskState::Completed;
        self.respond(code);
    }

    /// Drop the task without answering; used when posting itself failed.
    pub(crate) fn suppress_response(&mut self) {
        self.responded = true;
    }

    fn settle(&mut self, step: Step, outbox: &mut Outbox) -> TaskState {
        match step {
            Step::Paused => {
                let request = outbox.take_pause_request();
                if request.resume_id.is_some() {
                    self.pause_info = request.info;
                    self.resume_id = request.resume_id;
                }
                self.state = TaskState::Paused;
                debug!(task_id = self.seq_id, resume_id = ?self.resume_id, "task paused");
            }
            Step::Done(code) => {
                self.pause_info = None;
                self.resume_id = None;
                self.state = TaskState::Completed;
                debug!(task_id = self.seq_id, %code, "task completed");
                self.respond(code);
            }
        }
        self.state
    }

    fn respond(&mut self, code: ResultCode) {
        if self.responded {
            return;
        }
        self.responded = true;
        let Some(channel) = self.channel.as_ref() else {
            return;
        };
        let payload = std::mem::take(&mut self.payload);
        if let Err(e) = channel.deliver(self.caller.request_id, code, payload) {
            warn!(
                task_id = self.seq_id,
                request_id = self.caller.request_id,
                error = %e,
                "failed to deliver response"
            );
        }
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        if !self.responded {
            debug!(task_id = self.seq_id, code = ?self.code, "task destroyed unanswered");
            self.respond(ResultCode::TASK_TIMEOUT);
        }
        if let Some(Admission {
            requesters,
            generation: Some(generation),
        }) = self.admission.take()
        {
            requesters.task_out_for(self.caller.pid, generation);
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("seq_id", &self.seq_id)
            .field("code", &self.code)
            .field("state", &self.state)
            .field("caller", &self.caller)
            .field("pause_info", &self.pause_info)
            .field("resume_id", &self.resume_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WaitAction;
    use crate::infra::channel::InMemoryChannel;
    use std::time::Duration;

    fn outbox(requesters: &Arc<RequesterManager>) -> Outbox {
        Outbox::new(Arc::new(SeqGenerator::new()), Arc::clone(requesters))
    }

    fn caller(request_id: u64) -> CallerInfo {
        CallerInfo::new(10, "pkg.client").with_request_id(request_id)
    }

    #[test]
    fn test_execute_delivers_once() {
        let requesters = Arc::new(RequesterManager::default());
        let mut outbox = outbox(&requesters);
        let channel = Arc::new(InMemoryChannel::new());
        let mut task = Task::new(
            TaskCode::ListInputMethod,
            caller(1),
            Action::new(|ctx| {
                ctx.set_payload(b"pkg.a".to_vec());
                ResultCode::OK
            }),
        )
        .with_channel(channel.clone());

        assert_eq!(task.execute(&mut outbox), TaskState::Completed);
        assert_eq!(task.execute(&mut outbox), TaskState::Completed);
        drop(task);

        let responses = channel.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].code, ResultCode::OK);
        assert_eq!(responses[0].payload, b"pkg.a".to_vec());
    }

    #[test]
    fn test_drop_unanswered_synthesizes_timeout() {
        let requesters = Arc::new(RequesterManager::default());
        let mut outbox = outbox(&requesters);
        let channel = Arc::new(InMemoryChannel::new());
        let mut task = Task::new(
            TaskCode::ShowInput,
            caller(2),
            WaitAction::new(Duration::from_secs(1)),
        )
        .with_channel(channel.clone());

        assert_eq!(task.execute(&mut outbox), TaskState::Paused);
        assert!(task.resume_id().is_some());
        drop(task);

        let responses = channel.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].request_id, 2);
        assert_eq!(responses[0].code, ResultCode::TASK_TIMEOUT);
    }

    #[test]
    fn test_on_task_ignores_non_signal() {
        let requesters = Arc::new(RequesterManager::default());
        let mut outbox = outbox(&requesters);
        let mut task = Task::new(
            TaskCode::ShowInput,
            caller(3),
            WaitAction::new(Duration::from_secs(1)),
        );
        task.execute(&mut outbox);
        let resume_id = task.resume_id().unwrap();

        let mut impostor = Task::new(TaskCode::ListInputMethod, caller(4), Action::empty());
        impostor.suppress_response();
        impostor.seq_id = resume_id;
        assert_eq!(task.on_task(&impostor, &mut outbox), TaskState::Paused);

        let signal = Task::inner(TaskCode::ResumeWait, resume_id);
        assert_eq!(task.on_task(&signal, &mut outbox), TaskState::Completed);
    }

    #[test]
    fn test_admit_counts_against_caller() {
        let requesters = Arc::new(RequesterManager::default());
        let channel = Arc::new(InMemoryChannel::new());
        requesters.add_channel(10, channel.clone()).unwrap();
        let seq = SeqGenerator::new();

        let mut task = Task::new(TaskCode::ShowInput, caller(5), Action::empty())
            .with_channel(channel.clone());
        task.admit(&seq, &requesters);
        task.admit(&seq, &requesters);
        assert_eq!(task.seq_id(), 1);
        assert_eq!(requesters.in_flight(10), Some(1));

        drop(task);
        assert_eq!(requesters.in_flight(10), Some(0));
        assert_eq!(channel.len(), 1);
    }

    #[test]
    fn test_fail_delivers_given_code() {
        let channel = Arc::new(InMemoryChannel::new());
        let task = Task::new(TaskCode::ReleaseInput, caller(6), Action::empty())
            .with_channel(channel.clone());
        task.fail(ResultCode::TASK_DROPPED);

        let responses = channel.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].code, ResultCode::TASK_DROPPED);
    }

    #[test]
    fn test_pend_requires_active_task() {
        let mut task = Task::new(TaskCode::ShowInput, caller(7), Action::empty());
        task.suppress_response();
        assert!(matches!(
            task.pend(Action::empty()),
            Err(SchedulerError::PendFailed(_))
        ));
    }
}
