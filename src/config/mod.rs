//! Configuration models for the scheduler, its worker and its watchdog.

pub mod scheduler;

pub use scheduler::{SchedulerConfig, WatchdogConfig, ENV_PREFIX};
