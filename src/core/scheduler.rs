//! Thread-safe handle to the serial worker.
//!
//! [`Scheduler`] is what the IPC-facing layer holds, usually behind an
//! `Arc`. Posting admits the task on the calling thread (so the caller's
//! in-flight counter moves synchronously) and then hands it to the worker.
//! Everything else about the task happens on the worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::core::watchdog::{Heartbeat, Watchdog};
use crate::core::worker::{self, Command};
use crate::core::{
    Action, ActionContext, CallerInfo, PauseKind, RequesterManager, ResponseChannel, ResultCode,
    SchedulerError, SchedulerStats, Task, TaskManager,
};
use crate::util::{deadline_after, millis_u64, SeqGenerator};

const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to a running scheduler.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use ime_task_scheduler::config::SchedulerConfig;
/// use ime_task_scheduler::core::{Action, CallerInfo, ResultCode, Scheduler, Task, TaskCode};
/// use ime_task_scheduler::infra::channel::InMemoryChannel;
///
/// let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
/// let channel = Arc::new(InMemoryChannel::new());
/// let caller = CallerInfo::new(10, "pkg.client").with_request_id(1);
///
/// scheduler.register_channel(caller.pid, channel.clone()).unwrap();
/// let task = Task::new(TaskCode::IsPanelShown, caller, Action::new(|_| ResultCode::OK))
///     .with_channel(channel.clone());
/// scheduler.post(task).unwrap();
///
/// let response = channel.wait_for(1, Duration::from_secs(1)).unwrap();
/// assert_eq!(response.code, ResultCode::OK);
/// scheduler.shutdown();
/// ```
pub struct Scheduler {
    config: SchedulerConfig,
    commands: Mutex<Option<Sender<Command>>>,
    requesters: Arc<RequesterManager>,
    seq: Arc<SeqGenerator>,
    shutdown: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_thread: ThreadId,
    heartbeat: Arc<Heartbeat>,
    watchdog: Mutex<Option<Watchdog>>,
}

impl Scheduler {
    /// Start a scheduler with its own requester registry.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] for a bad configuration, or
    /// [`SchedulerError::Worker`] if a thread cannot be spawned.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let requesters = Arc::new(RequesterManager::new(config.max_requests_per_caller));
        Self::with_requesters(config, requesters)
    }

    /// Start a scheduler sharing `requesters` with the IPC layer.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::new`].
    pub fn with_requesters(
        config: SchedulerConfig,
        requesters: Arc<RequesterManager>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let seq = Arc::new(SeqGenerator::new());
        let heartbeat = Arc::new(Heartbeat::new());
        let manager = TaskManager::new(&config, Arc::clone(&requesters), Arc::clone(&seq));
        let (tx, rx) = bounded::<Command>(config.command_queue_depth);
        let handle = worker::spawn(&config, manager, rx, Arc::clone(&heartbeat))?;
        let worker_thread = handle.thread().id();

        let watchdog = if config.watchdog.enabled {
            Some(Watchdog::spawn(&config.watchdog, Arc::clone(&heartbeat))?)
        } else {
            None
        };

        info!(
            worker = %config.worker_thread_name,
            command_queue_depth = config.command_queue_depth,
            max_requests_per_caller = config.max_requests_per_caller,
            watchdog = config.watchdog.enabled,
            "scheduler started"
        );

        Ok(Self {
            config,
            commands: Mutex::new(Some(tx)),
            requesters,
            seq,
            shutdown: AtomicBool::new(false),
            worker: Mutex::new(Some(handle)),
            worker_thread,
            heartbeat,
            watchdog: Mutex::new(watchdog),
        })
    }

    /// Admit `task` and schedule it after `delay`. Returns its sequence id.
    ///
    /// A task whose post fails is released without a response.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NullTask`] if `task` is `None`, or
    /// [`SchedulerError::PostFailed`] if the worker cannot accept it.
    pub fn post_task(&self, task: Option<Task>, delay: Duration) -> Result<u64, SchedulerError> {
        let mut task = task.ok_or(SchedulerError::NullTask)?;
        task.admit(&self.seq, &self.requesters);
        let seq_id = task.seq_id();
        let due = deadline_after(Instant::now(), delay);

        self.send(Command::Post { task, due }).map_err(|(command, reason)| {
            if let Command::Post { mut task, .. } = command {
                task.suppress_response();
            }
            warn!(task_id = seq_id, %reason, "post failed");
            SchedulerError::PostFailed(reason)
        })?;
        debug!(task_id = seq_id, delay_ms = millis_u64(delay), "task posted");
        Ok(seq_id)
    }

    /// [`Scheduler::post_task`] with no delay.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::post_task`].
    pub fn post(&self, task: Task) -> Result<u64, SchedulerError> {
        self.post_task(Some(task), Duration::ZERO)
    }

    /// Deliver `resume_id` to the paused task.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::PostFailed`] if the worker cannot accept the signal.
    pub fn complete(&self, resume_id: u64) -> Result<(), SchedulerError> {
        self.send(Command::Complete { resume_id })
            .map_err(|(_, reason)| SchedulerError::PostFailed(reason))
    }

    /// Resume the paused task if it waits for `kind` from `caller`'s bundle.
    ///
    /// Non-matching callers are ignored on the worker.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::PostFailed`] if the worker cannot accept the request.
    pub fn try_resume(&self, kind: PauseKind, caller: CallerInfo) -> Result<(), SchedulerError> {
        self.send(Command::TryResume { kind, caller })
            .map_err(|(_, reason)| SchedulerError::PostFailed(reason))
    }

    /// Add `action` to whatever is active inside the current task.
    ///
    /// Blocks until the worker answers. Work running on the worker must use
    /// [`ActionContext::pend`] instead.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::PendFailed`] if there is no current task, if called
    /// from the worker thread, or if the worker cannot accept the request;
    /// [`SchedulerError::Worker`] if it does not answer in time.
    pub fn pend(&self, action: Action) -> Result<(), SchedulerError> {
        if self.on_worker_thread() {
            return Err(SchedulerError::PendFailed(
                "called from the worker thread".into(),
            ));
        }
        let (reply_tx, reply_rx) = bounded(1);
        self.send(Command::Pend {
            action,
            reply: reply_tx,
        })
        .map_err(|(_, reason)| SchedulerError::PendFailed(reason))?;
        reply_rx
            .recv_timeout(self.control_timeout())
            .map_err(|_| SchedulerError::Worker("no answer to pend".into()))?
    }

    /// [`Scheduler::pend`] for a bare work function.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::pend`].
    pub fn pend_fn<F>(&self, work: F) -> Result<(), SchedulerError>
    where
        F: FnOnce(&mut ActionContext<'_>) -> ResultCode + Send + 'static,
    {
        self.pend(Action::new(work))
    }

    /// Snapshot of the worker's state.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Worker`] if called from the worker thread, after
    /// shutdown, or if the worker does not answer in time.
    pub fn stats(&self) -> Result<SchedulerStats, SchedulerError> {
        if self.on_worker_thread() {
            return Err(SchedulerError::Worker(
                "stats requested from the worker thread".into(),
            ));
        }
        let (reply_tx, reply_rx) = bounded(1);
        self.send(Command::Stats { reply: reply_tx })
            .map_err(|(_, reason)| SchedulerError::Worker(reason))?;
        let mut stats = reply_rx
            .recv_timeout(self.control_timeout())
            .map_err(|_| SchedulerError::Worker("no answer to stats".into()))?;
        stats.stalled = self.heartbeat.is_stalled();
        Ok(stats)
    }

    /// Register the response channel of caller `pid`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::ChannelConflict`] if `pid` already has a live channel.
    pub fn register_channel(
        &self,
        pid: i32,
        channel: Arc<dyn ResponseChannel>,
    ) -> Result<(), SchedulerError> {
        self.requesters.add_channel(pid, channel)
    }

    /// Forget caller `pid` after its process died.
    pub fn on_process_died(&self, pid: i32) {
        self.requesters.on_process_died(pid);
    }

    /// Shared requester registry.
    #[must_use]
    pub const fn requesters(&self) -> &Arc<RequesterManager> {
        &self.requesters
    }

    /// Configuration the scheduler was started with.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Whether the watchdog has seen the worker stall.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.heartbeat.is_stalled()
    }

    /// Whether [`Scheduler::shutdown`] has run or the handle was dropped.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop accepting work, let the worker drain and drop what is left, and
    /// join the worker and watchdog threads with a bounded wait.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down scheduler");
        self.commands.lock().take();

        if let Some(handle) = self.worker.lock().take() {
            // Join on a helper thread so a wedged worker cannot hang shutdown.
            let (tx, rx) = std::sync::mpsc::channel();
            let join_thread = thread::spawn(move || {
                let _ = tx.send(handle.join().is_ok());
            });
            match rx.recv_timeout(JOIN_TIMEOUT) {
                Ok(true) => debug!("worker joined"),
                Ok(false) => warn!("worker panicked"),
                Err(_) => warn!("worker did not exit within timeout, detaching"),
            }
            drop(join_thread);
        }

        if let Some(mut watchdog) = self.watchdog.lock().take() {
            watchdog.stop();
        }
        info!("scheduler shut down");
    }

    fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.config.control_timeout_ms)
    }

    fn on_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_thread
    }

    /// Hand `command` to the worker. On failure the command comes back so the
    /// caller can release it outside the lock.
    fn send(&self, command: Command) -> Result<(), (Command, String)> {
        let guard = self.commands.lock();
        let Some(tx) = guard.as_ref() else {
            return Err((command, "scheduler is shut down".into()));
        };
        match tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => {
                warn!(depth = self.config.command_queue_depth, "command queue full");
                Err((command, "command queue full".into()))
            }
            Err(TrySendError::Disconnected(command)) => {
                Err((command, "worker has exited".into()))
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Signal only; joining is left to `shutdown`.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.commands.lock().take();
            if let Some(watchdog) = self.watchdog.lock().take() {
                drop(watchdog);
            }
            debug!("scheduler dropped without explicit shutdown");
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("worker", &self.config.worker_thread_name)
            .field("shutdown", &self.is_shutdown())
            .field("stalled", &self.is_stalled())
            .finish_non_exhaustive()
    }
}
