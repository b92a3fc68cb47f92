//! Priority queues and the single current-task slot.
//!
//! `TaskManager` is plain single-threaded state. The [`Scheduler`] wraps it
//! in a serial worker thread; tests and embedders that already own a serial
//! context can drive it directly and advance its clock by hand.
//!
//! Every entry point feeds the task through `on_new_task`, which queues it
//! by class and runs a full processing pass. Side effects raised during a
//! pass (follow-up posts, resume signals) are fed back the same way once the
//! pass returns.
//!
//! [`Scheduler`]: crate::core::Scheduler

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::core::outbox::Outbox;
use crate::core::{
    Action, CallerInfo, PauseInfo, PauseKind, RequesterManager, ResultCode, SchedulerError, Task,
    TaskClass, TaskCode, TaskState,
};
use crate::util::SeqGenerator;

/// Snapshot of the task occupying the current slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentTask {
    /// Sequence id of the task.
    pub seq_id: u64,
    /// Task code.
    pub code: TaskCode,
    /// Lifecycle state; always [`TaskState::Paused`] between passes.
    pub state: TaskState,
    /// What the task waits for, if its wait names a target.
    pub pause_info: Option<PauseInfo>,
    /// Id that completes the current wait.
    pub resume_id: Option<u64>,
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Queue depth per class, indexed by [`TaskClass::index`].
    pub queued: [usize; TaskClass::COUNT],
    /// The current task, if any.
    pub current: Option<CurrentTask>,
    /// Delayed posts and wait timeouts not yet due.
    pub pending_timers: usize,
    /// Whether the watchdog saw the serial worker stall.
    pub stalled: bool,
}

impl SchedulerStats {
    /// Queue depth of `class`.
    #[must_use]
    pub const fn queued(&self, class: TaskClass) -> usize {
        self.queued[class.index()]
    }

    /// Tasks waiting in any queue.
    #[must_use]
    pub fn total_queued(&self) -> usize {
        self.queued.iter().sum()
    }
}

/// Six priority queues, the Inner signal queue and the current task.
pub struct TaskManager {
    queues: [VecDeque<Task>; TaskClass::COUNT],
    current: Option<Task>,
    outbox: Outbox,
    allow_list: HashSet<TaskCode>,
}

impl TaskManager {
    /// Create a manager sharing `requesters` and `seq` with its posters.
    #[must_use]
    pub fn new(
        config: &SchedulerConfig,
        requesters: Arc<RequesterManager>,
        seq: Arc<SeqGenerator>,
    ) -> Self {
        Self {
            queues: Default::default(),
            current: None,
            outbox: Outbox::new(seq, requesters),
            allow_list: config.admission_allow_list.iter().copied().collect(),
        }
    }

    /// Admit `task` and schedule it after `delay`.
    ///
    /// Returns the task's sequence id.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NullTask`] if `task` is `None`.
    pub fn post_task(&mut self, task: Option<Task>, delay: Duration) -> Result<u64, SchedulerError> {
        let task = task.ok_or(SchedulerError::NullTask)?;
        let seq_id = self.outbox.post(task, delay);
        self.run_ready();
        Ok(seq_id)
    }

    /// [`TaskManager::post_task`] with no delay.
    ///
    /// # Errors
    ///
    /// Never fails for a present task; kept fallible to mirror `post_task`.
    pub fn post(&mut self, task: Task) -> Result<u64, SchedulerError> {
        self.post_task(Some(task), Duration::ZERO)
    }

    /// Schedule an already admitted task for `due`.
    pub(crate) fn accept(&mut self, task: Task, due: Instant) {
        self.outbox.schedule(task, due);
        self.run_ready();
    }

    /// Deliver `resume_id` to the paused task.
    pub fn complete(&mut self, resume_id: u64) {
        self.outbox
            .signal(TaskCode::ResumeWait, resume_id, Duration::ZERO);
        self.run_ready();
    }

    /// Resume the paused task if it waits for `kind` from `caller`'s bundle.
    ///
    /// Returns whether a resume was issued. Non-matching callers are ignored.
    pub fn try_resume(&mut self, kind: PauseKind, caller: &CallerInfo) -> bool {
        let resume_id = self
            .current
            .as_ref()
            .and_then(Task::pause_info)
            .filter(|pause| pause.matches(kind, caller))
            .map(|pause| pause.resume_id);
        match resume_id {
            Some(resume_id) => {
                debug!(resume_id, bundle = %caller.bundle_name, "resume matched paused task");
                self.complete(resume_id);
                true
            }
            None => {
                debug!(?kind, bundle = %caller.bundle_name, "resume did not match, ignored");
                false
            }
        }
    }

    /// Add `action` to whatever is active inside the current task.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::PendFailed`] if there is no current task.
    pub fn pend(&mut self, action: Action) -> Result<(), SchedulerError> {
        let current = self
            .current
            .as_mut()
            .ok_or_else(|| SchedulerError::PendFailed("no current task".into()))?;
        current.pend(action)
    }

    /// Advance the clock to `now` and run everything that became due.
    pub fn advance_to(&mut self, now: Instant) {
        self.outbox.set_now(now);
        self.outbox.release_due();
        self.run_ready();
    }

    /// The manager's clock.
    #[must_use]
    pub const fn now(&self) -> Instant {
        self.outbox.now()
    }

    /// When the earliest delayed post or wait timeout falls due.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.outbox.next_deadline()
    }

    /// The current task, always paused between passes.
    #[must_use]
    pub const fn current(&self) -> Option<&Task> {
        self.current.as_ref()
    }

    /// Snapshot of queue depths and the current task.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let mut queued = [0; TaskClass::COUNT];
        for (depth, queue) in queued.iter_mut().zip(&self.queues) {
            *depth = queue.len();
        }
        SchedulerStats {
            queued,
            current: self.current.as_ref().map(|task| CurrentTask {
                seq_id: task.seq_id(),
                code: task.code(),
                state: task.state(),
                pause_info: task.pause_info().cloned(),
                resume_id: task.resume_id(),
            }),
            pending_timers: self.outbox.pending_timers(),
            stalled: false,
        }
    }

    /// Drop every queued, timed and current task.
    ///
    /// Each unanswered task receives [`ResultCode::TASK_TIMEOUT`]. Returns
    /// how many tasks were dropped.
    pub fn shutdown(&mut self) -> usize {
        let mut dropped: Vec<Task> = self.current.take().into_iter().collect();
        for queue in &mut self.queues {
            dropped.extend(queue.drain(..));
        }
        dropped.extend(self.outbox.drain());
        let count = dropped
            .iter()
            .filter(|task| task.class() != TaskClass::Inner)
            .count();
        drop(dropped);
        info!(dropped = count, "task manager shut down");
        count
    }

    fn run_ready(&mut self) {
        while let Some(task) = self.outbox.pop_ready() {
            self.on_new_task(task);
        }
    }

    fn on_new_task(&mut self, task: Task) {
        debug!(task_id = task.seq_id(), code = ?task.code(), "task queued");
        self.queues[task.class().index()].push_back(task);
        self.process();
    }

    fn process(&mut self) {
        loop {
            self.process_critical();
            self.process_switch_ime();
            self.process_requests(TaskClass::HigherRequest);
            self.process_requests(TaskClass::NormalRequest);
            self.process_immediate(TaskClass::Query);
            self.process_immediate(TaskClass::Resume);
            if !self.process_inner() {
                break;
            }
        }
    }

    fn process_critical(&mut self) {
        let queue = TaskClass::CriticalChange.index();
        while !self.queues[queue].is_empty() {
            if self
                .current
                .as_ref()
                .is_some_and(|current| current.class() == TaskClass::CriticalChange)
            {
                return;
            }
            let Some(task) = self.queues[queue].pop_front() else {
                return;
            };
            if let Some(dropped) = self.current.take() {
                warn!(
                    task_id = dropped.seq_id(),
                    code = ?dropped.code(),
                    by = task.seq_id(),
                    "current task dropped for critical change"
                );
            }
            self.execute_current(task);
        }
    }

    fn process_switch_ime(&mut self) {
        let queue = TaskClass::SwitchIme.index();
        while self.current.is_none() {
            let Some(task) = self.queues[queue].pop_front() else {
                return;
            };
            self.execute_current(task);
        }
    }

    fn process_requests(&mut self, class: TaskClass) {
        let queue = class.index();
        while self.current.is_none() {
            let Some(task) = self.queues[queue].pop_front() else {
                return;
            };
            self.execute_current(task);
        }

        let Some(target) = self
            .current
            .as_ref()
            .and_then(Task::pause_info)
            .map(|pause| pause.target_bundle_name.clone())
        else {
            return;
        };
        let queued = std::mem::take(&mut self.queues[queue]);
        for task in queued {
            if task.caller().bundle_name != target {
                self.queues[queue].push_back(task);
            } else if self.allow_list.contains(&task.code()) {
                self.run_aside(task);
            } else {
                warn!(
                    task_id = task.seq_id(),
                    code = ?task.code(),
                    bundle = %target,
                    "request from awaited target not allowed while paused, dropped"
                );
                task.fail(ResultCode::TASK_DROPPED);
            }
        }
    }

    fn process_immediate(&mut self, class: TaskClass) {
        let queue = class.index();
        while let Some(task) = self.queues[queue].pop_front() {
            if self.current.is_some() {
                self.run_aside(task);
            } else {
                self.execute_current(task);
            }
        }
    }

    /// Returns whether a signal finished the current task.
    fn process_inner(&mut self) -> bool {
        let queue = TaskClass::Inner.index();
        while let Some(signal) = self.queues[queue].pop_front() {
            let Some(current) = self.current.as_mut() else {
                debug!(resume_id = signal.seq_id(), "signal with no paused task dropped");
                continue;
            };
            if current.on_task(&signal, &mut self.outbox) != TaskState::Paused {
                self.current = None;
                return true;
            }
        }
        false
    }

    fn execute_current(&mut self, mut task: Task) {
        self.outbox.observe_pause(None);
        if task.execute(&mut self.outbox) == TaskState::Paused {
            self.current = Some(task);
        }
    }

    /// Run `task` while the paused current task is set aside, then restore it.
    fn run_aside(&mut self, mut task: Task) {
        let parked = self.current.take();
        self.outbox
            .observe_pause(parked.as_ref().and_then(Task::pause_info).cloned());
        if task.execute(&mut self.outbox) == TaskState::Paused {
            warn!(
                task_id = task.seq_id(),
                code = ?task.code(),
                "task paused while another task is paused, dropped"
            );
            drop(task);
        }
        self.outbox.observe_pause(None);
        self.current = parked;
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        let config = SchedulerConfig::default();
        Self::new(
            &config,
            Arc::new(RequesterManager::new(config.max_requests_per_caller)),
            Arc::new(SeqGenerator::new()),
        )
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        if self.current.is_some() || self.queues.iter().any(|queue| !queue.is_empty()) {
            self.shutdown();
        }
    }
}
