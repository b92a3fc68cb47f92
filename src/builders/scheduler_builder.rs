//! Fluent construction of a [`Scheduler`].

use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::core::{RequesterManager, ResponseChannel, Scheduler, SchedulerError};

/// Collects configuration, a requester registry and pre-registered channels.
///
/// ```rust
/// use std::sync::Arc;
/// use ime_task_scheduler::builders::SchedulerBuilder;
/// use ime_task_scheduler::infra::channel::InMemoryChannel;
///
/// let scheduler = SchedulerBuilder::new()
///     .max_requests_per_caller(4)
///     .without_watchdog()
///     .channel(10, Arc::new(InMemoryChannel::new()))
///     .build()
///     .unwrap();
/// assert_eq!(scheduler.requesters().len(), 1);
/// scheduler.shutdown();
/// ```
#[derive(Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    requesters: Option<Arc<RequesterManager>>,
    channels: Vec<(i32, Arc<dyn ResponseChannel>)>,
}

impl SchedulerBuilder {
    /// Start from the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from `config`.
    #[must_use]
    pub fn from_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Set the per-caller in-flight budget.
    #[must_use]
    pub fn max_requests_per_caller(mut self, max: u32) -> Self {
        self.config.max_requests_per_caller = max;
        self
    }

    /// Set the command queue capacity.
    #[must_use]
    pub fn command_queue_depth(mut self, depth: usize) -> Self {
        self.config.command_queue_depth = depth;
        self
    }

    /// Disable the liveness watchdog.
    #[must_use]
    pub fn without_watchdog(mut self) -> Self {
        self.config.watchdog.enabled = false;
        self
    }

    /// Share an existing requester registry instead of creating one.
    #[must_use]
    pub fn requesters(mut self, requesters: Arc<RequesterManager>) -> Self {
        self.requesters = Some(requesters);
        self
    }

    /// Register `channel` for `pid` when the scheduler is built.
    #[must_use]
    pub fn channel(mut self, pid: i32, channel: Arc<dyn ResponseChannel>) -> Self {
        self.channels.push((pid, channel));
        self
    }

    /// Start the scheduler.
    ///
    /// # Errors
    ///
    /// Configuration, thread-spawn and channel-registration errors.
    pub fn build(self) -> Result<Scheduler, SchedulerError> {
        let requesters = self.requesters.unwrap_or_else(|| {
            Arc::new(RequesterManager::new(self.config.max_requests_per_caller))
        });
        for (pid, channel) in self.channels {
            requesters.add_channel(pid, channel)?;
        }
        Scheduler::with_requesters(self.config, requesters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::channel::InMemoryChannel;

    #[test]
    fn test_build_rejects_invalid_config() {
        let result = SchedulerBuilder::new().command_queue_depth(0).build();
        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
    }

    #[test]
    fn test_build_shares_requesters() {
        let requesters = Arc::new(RequesterManager::new(2));
        let scheduler = SchedulerBuilder::new()
            .without_watchdog()
            .requesters(Arc::clone(&requesters))
            .channel(7, Arc::new(InMemoryChannel::new()))
            .build()
            .unwrap();
        assert!(Arc::ptr_eq(scheduler.requesters(), &requesters));
        assert_eq!(requesters.in_flight(7), Some(0));
        scheduler.shutdown();
    }
}
