//! Per-caller admission control.
//!
//! Each caller process registers one response channel and is allowed a fixed
//! number of tasks in flight. This is the only scheduler state touched from
//! arbitrary threads, so it sits behind a `parking_lot::Mutex`.
//!
//! Every registration gets a generation number. A task remembers the
//! generation it was counted against, so a task that outlives its process
//! never releases a slot belonging to the pid's next registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::core::{ResponseChannel, SchedulerError};

/// Default per-caller in-flight budget.
pub const DEFAULT_MAX_IN_FLIGHT: u32 = 6;

struct RequesterInfo {
    channel: Arc<dyn ResponseChannel>,
    in_flight: u32,
    generation: u64,
}

/// Registered callers and their in-flight counters.
pub struct RequesterManager {
    max_in_flight: u32,
    requesters: Mutex<HashMap<i32, RequesterInfo>>,
    generations: AtomicU64,
}

impl RequesterManager {
    /// Create a manager allowing `max_in_flight` concurrent tasks per caller.
    #[must_use]
    pub fn new(max_in_flight: u32) -> Self {
        Self {
            max_in_flight,
            requesters: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(1),
        }
    }

    /// Per-caller budget.
    #[must_use]
    pub const fn max_in_flight(&self) -> u32 {
        self.max_in_flight
    }

    /// Channel for `pid`, if it is registered and under budget.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotRegistered`] if `pid` never registered, or
    /// [`SchedulerError::TooManyRequests`] if its budget is used up.
    pub fn get_requester(&self, pid: i32) -> Result<Arc<dyn ResponseChannel>, SchedulerError> {
        let requesters = self.requesters.lock();
        let info = requesters
            .get(&pid)
            .ok_or(SchedulerError::NotRegistered(pid))?;
        if info.in_flight >= self.max_in_flight {
            warn!(pid, in_flight = info.in_flight, "caller over request budget");
            return Err(SchedulerError::TooManyRequests {
                pid,
                in_flight: info.in_flight,
            });
        }
        Ok(Arc::clone(&info.channel))
    }

    /// Register `channel` for `pid`.
    ///
    /// Registering the same channel again is a no-op. A different channel
    /// replaces the old one only if the old one is no longer alive.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::ChannelConflict`] if `pid` already has a live channel.
    pub fn add_channel(
        &self,
        pid: i32,
        channel: Arc<dyn ResponseChannel>,
    ) -> Result<(), SchedulerError> {
        let mut requesters = self.requesters.lock();
        match requesters.get_mut(&pid) {
            Some(info) if std::ptr::addr_eq(Arc::as_ptr(&info.channel), Arc::as_ptr(&channel)) => {
                Ok(())
            }
            Some(info) if info.channel.is_alive() => {
                warn!(pid, "rejecting second live channel");
                Err(SchedulerError::ChannelConflict(pid))
            }
            Some(info) => {
                debug!(pid, "replacing dead channel");
                info.channel = channel;
                Ok(())
            }
            None => {
                debug!(pid, "channel registered");
                requesters.insert(
                    pid,
                    RequesterInfo {
                        channel,
                        in_flight: 0,
                        generation: self.generations.fetch_add(1, Ordering::Relaxed),
                    },
                );
                Ok(())
            }
        }
    }

    /// Count one more task for `pid`. Unknown callers are ignored.
    ///
    /// Returns the generation of the registration the task was counted
    /// against, for [`RequesterManager::task_out_for`].
    pub fn task_in(&self, pid: i32) -> Option<u64> {
        self.requesters.lock().get_mut(&pid).map(|info| {
            info.in_flight = info.in_flight.saturating_add(1);
            info.generation
        })
    }

    /// Count one task fewer for `pid`. Never goes below zero.
    pub fn task_out(&self, pid: i32) {
        if let Some(info) = self.requesters.lock().get_mut(&pid) {
            info.in_flight = info.in_flight.saturating_sub(1);
        }
    }

    /// Release a task counted by [`RequesterManager::task_in`] under
    /// `generation`. Ignored if `pid` has registered again since.
    pub fn task_out_for(&self, pid: i32, generation: u64) {
        match self.requesters.lock().get_mut(&pid) {
            Some(info) if info.generation == generation => {
                info.in_flight = info.in_flight.saturating_sub(1);
            }
            Some(_) => debug!(pid, generation, "release from an earlier registration ignored"),
            None => {}
        }
    }

    /// Forget everything about `pid`.
    pub fn on_process_died(&self, pid: i32) {
        if self.requesters.lock().remove(&pid).is_some() {
            info!(pid, "requester removed after process death");
        }
    }

    /// In-flight count for `pid`, if registered.
    #[must_use]
    pub fn in_flight(&self, pid: i32) -> Option<u32> {
        self.requesters.lock().get(&pid).map(|info| info.in_flight)
    }

    /// Number of registered callers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requesters.lock().len()
    }

    /// Whether no caller is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requesters.lock().is_empty()
    }
}

impl Default for RequesterManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}

impl std::fmt::Debug for RequesterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequesterManager")
            .field("max_in_flight", &self.max_in_flight)
            .field("registered", &self.len())
            .finish()
    }
}
