//! Side effects raised while actions run on the serial worker.
//!
//! Work functions never touch the scheduler queues directly. Posts, resume
//! signals and wait timeouts land here and the task manager feeds them back
//! through `OnNewTask` once the current processing pass has returned.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::{PauseInfo, RequesterManager, Task, TaskCode};
use crate::util::{deadline_after, SeqGenerator};

/// A task waiting for its due time.
struct Timer {
    due: Instant,
    order: u64,
    task: Task,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.order == other.order
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earliest due first (reversed for max-heap), then post order.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Pause recorded by the wait that just suspended its tree.
#[derive(Debug, Default)]
pub(crate) struct PauseRequest {
    pub(crate) info: Option<PauseInfo>,
    pub(crate) resume_id: Option<u64>,
}

pub(crate) struct Outbox {
    now: Instant,
    ready: VecDeque<Task>,
    timers: BinaryHeap<Timer>,
    timer_order: u64,
    seq: Arc<SeqGenerator>,
    requesters: Arc<RequesterManager>,
    observed_pause: Option<PauseInfo>,
    pause_request: PauseRequest,
}

impl Outbox {
    pub(crate) fn new(seq: Arc<SeqGenerator>, requesters: Arc<RequesterManager>) -> Self {
        Self {
            now: Instant::now(),
            ready: VecDeque::new(),
            timers: BinaryHeap::new(),
            timer_order: 0,
            seq,
            requesters,
            observed_pause: None,
            pause_request: PauseRequest::default(),
        }
    }

    pub(crate) const fn now(&self) -> Instant {
        self.now
    }

    /// Move the clock forward. The clock never runs backwards.
    pub(crate) fn set_now(&mut self, now: Instant) {
        if now > self.now {
            self.now = now;
        }
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.seq.next_id()
    }

    /// Admit a task and schedule it after `delay`. Returns its sequence id.
    pub(crate) fn post(&mut self, mut task: Task, delay: Duration) -> u64 {
        task.admit(&self.seq, &self.requesters);
        let seq_id = task.seq_id();
        let due = deadline_after(self.now, delay);
        self.schedule(task, due);
        seq_id
    }

    /// Queue an already admitted task for `due`.
    pub(crate) fn schedule(&mut self, task: Task, due: Instant) {
        if due <= self.now {
            self.ready.push_back(task);
            return;
        }
        self.timer_order += 1;
        self.timers.push(Timer {
            due,
            order: self.timer_order,
            task,
        });
    }

    /// Schedule a resume or timeout signal for the paused task.
    pub(crate) fn signal(&mut self, code: TaskCode, resume_id: u64, delay: Duration) {
        let due = deadline_after(self.now, delay);
        self.schedule(Task::inner(code, resume_id), due);
    }

    pub(crate) fn pop_ready(&mut self) -> Option<Task> {
        self.ready.pop_front()
    }

    /// Move every timer due at or before the current clock to the ready list.
    pub(crate) fn release_due(&mut self) {
        while self.timers.peek().is_some_and(|timer| timer.due <= self.now) {
            if let Some(timer) = self.timers.pop() {
                self.ready.push_back(timer.task);
            }
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        if self.ready.is_empty() {
            self.timers.peek().map(|timer| timer.due)
        } else {
            Some(self.now)
        }
    }

    pub(crate) fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Pause that `TryResume` calls made by running work are checked against.
    pub(crate) fn observe_pause(&mut self, pause: Option<PauseInfo>) {
        self.observed_pause = pause;
    }

    pub(crate) const fn observed_pause(&self) -> Option<&PauseInfo> {
        self.observed_pause.as_ref()
    }

    pub(crate) fn request_pause(&mut self, info: Option<PauseInfo>, resume_id: u64) {
        self.pause_request = PauseRequest {
            info,
            resume_id: Some(resume_id),
        };
    }

    pub(crate) fn take_pause_request(&mut self) -> PauseRequest {
        std::mem::take(&mut self.pause_request)
    }

    /// Hand back everything still scheduled, ready tasks first.
    pub(crate) fn drain(&mut self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.ready.drain(..).collect();
        tasks.extend(self.timers.drain().map(|timer| timer.task));
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbox() -> Outbox {
        Outbox::new(
            Arc::new(SeqGenerator::new()),
            Arc::new(RequesterManager::default()),
        )
    }

    #[test]
    fn test_immediate_signal_is_ready() {
        let mut outbox = outbox();
        outbox.signal(TaskCode::ResumeWait, 5, Duration::ZERO);
        let task = outbox.pop_ready().unwrap();
        assert_eq!(task.seq_id(), 5);
        assert_eq!(outbox.pending_timers(), 0);
    }

    #[test]
    fn test_timers_release_in_due_order() {
        let mut outbox = outbox();
        let start = outbox.now();
        outbox.signal(TaskCode::ResumeTimeout, 2, Duration::from_millis(20));
        outbox.signal(TaskCode::ResumeTimeout, 1, Duration::from_millis(10));
        outbox.signal(TaskCode::ResumeTimeout, 3, Duration::from_millis(30));
        assert!(outbox.pop_ready().is_none());
        assert_eq!(outbox.next_deadline(), Some(start + Duration::from_millis(10)));

        outbox.set_now(start + Duration::from_millis(20));
        outbox.release_due();
        assert_eq!(outbox.pop_ready().unwrap().seq_id(), 1);
        assert_eq!(outbox.pop_ready().unwrap().seq_id(), 2);
        assert!(outbox.pop_ready().is_none());
        assert_eq!(outbox.pending_timers(), 1);
    }

    #[test]
    fn test_clock_never_goes_back() {
        let mut outbox = outbox();
        let start = outbox.now();
        outbox.set_now(start + Duration::from_millis(5));
        outbox.set_now(start);
        assert_eq!(outbox.now(), start + Duration::from_millis(5));
    }

    #[test]
    fn test_pause_request_taken_once() {
        let mut outbox = outbox();
        outbox.request_pause(None, 9);
        assert_eq!(outbox.take_pause_request().resume_id, Some(9));
        assert_eq!(outbox.take_pause_request().resume_id, None);
    }
}
