//! Liveness monitoring for the serial worker.
//!
//! The worker stamps a [`Heartbeat`] around every command it handles. A
//! monitor thread samples it; a handler that stays busy past the configured
//! timeout means some action blocked the worker, which is a programming
//! error. The monitor logs it, marks the scheduler stalled and, if
//! configured, aborts the process.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::{debug, error, info};

use crate::config::WatchdogConfig;
use crate::core::SchedulerError;
use crate::util::millis_u64;

/// Busy marker shared between the worker and the monitor.
#[derive(Debug)]
pub struct Heartbeat {
    epoch: Instant,
    // Millis since `epoch` (+1) when the current handler began; 0 when idle.
    busy_since_ms: AtomicU64,
    stalled: AtomicBool,
}

impl Heartbeat {
    /// A heartbeat that starts idle.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            busy_since_ms: AtomicU64::new(0),
            stalled: AtomicBool::new(false),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        millis_u64(self.epoch.elapsed())
    }

    /// Mark the worker busy.
    pub fn begin(&self) {
        self.busy_since_ms
            .store(self.elapsed_ms().saturating_add(1), Ordering::Release);
    }

    /// Mark the worker idle.
    pub fn end(&self) {
        self.busy_since_ms.store(0, Ordering::Release);
    }

    /// How long the current handler has been running, if one is.
    #[must_use]
    pub fn busy_for(&self) -> Option<Duration> {
        match self.busy_since_ms.load(Ordering::Acquire) {
            0 => None,
            since => Some(Duration::from_millis(
                self.elapsed_ms().saturating_sub(since - 1),
            )),
        }
    }

    /// Whether a stall was ever observed.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::Acquire)
    }

    fn mark_stalled(&self) -> bool {
        !self.stalled.swap(true, Ordering::AcqRel)
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

/// Monitor thread watching one [`Heartbeat`].
pub struct Watchdog {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Start monitoring `heartbeat`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Worker`] if the monitor thread cannot be spawned.
    pub fn spawn(config: &WatchdogConfig, heartbeat: Arc<Heartbeat>) -> Result<Self, SchedulerError> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let timeout = Duration::from_millis(config.timeout_ms);
        let interval = Duration::from_millis(config.check_interval_ms);
        let abort_on_stall = config.abort_on_stall;

        let handle = thread::Builder::new()
            .name("ime-sched-watchdog".into())
            .spawn(move || {
                debug!(timeout_ms = millis_u64(timeout), "watchdog started");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let Some(busy) = heartbeat.busy_for() else {
                        continue;
                    };
                    if busy < timeout {
                        continue;
                    }
                    if heartbeat.mark_stalled() {
                        error!(
                            busy_ms = millis_u64(busy),
                            timeout_ms = millis_u64(timeout),
                            "serial worker blocked past watchdog timeout"
                        );
                    }
                    if abort_on_stall {
                        error!("aborting on worker stall");
                        std::process::abort();
                    }
                }
                debug!("watchdog exiting");
            })
            .map_err(|e| SchedulerError::Worker(format!("failed to spawn watchdog: {e}")))?;

        info!(
            timeout_ms = config.timeout_ms,
            check_interval_ms = config.check_interval_ms,
            "watchdog initialized"
        );
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the monitor and wait for it to exit.
    pub fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("watchdog thread panicked");
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        // Signal only; joining is left to `stop`.
        self.stop_tx.take();
    }
}
