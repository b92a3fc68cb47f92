//! Scheduler and watchdog configuration.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, TaskClass, TaskCode, DEFAULT_MAX_IN_FLIGHT};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "IME_SCHED_";

/// Liveness watchdog settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Whether the monitor thread runs.
    pub enabled: bool,
    /// A handler busy this long counts as a stall.
    pub timeout_ms: u64,
    /// How often the monitor samples the heartbeat.
    pub check_interval_ms: u64,
    /// Abort the process on a stall instead of only logging it.
    pub abort_on_stall: bool,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 10_000,
            check_interval_ms: 500,
            abort_on_stall: false,
        }
    }
}

impl WatchdogConfig {
    /// Validate timing values.
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if self.timeout_ms == 0 {
            return Err("watchdog.timeout_ms must be greater than 0".into());
        }
        if self.check_interval_ms == 0 {
            return Err("watchdog.check_interval_ms must be greater than 0".into());
        }
        if self.check_interval_ms >= self.timeout_ms {
            return Err("watchdog.check_interval_ms must be shorter than timeout_ms".into());
        }
        Ok(())
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tasks one caller process may have in flight.
    pub max_requests_per_caller: u32,
    /// Request codes the awaited caller may run while a task waits on it.
    pub admission_allow_list: Vec<TaskCode>,
    /// Capacity of the command queue in front of the worker.
    pub command_queue_depth: usize,
    /// How long synchronous queries (`pend`, `stats`) wait for the worker.
    pub control_timeout_ms: u64,
    /// Name of the serial worker thread.
    pub worker_thread_name: String,
    /// Stack size of the serial worker thread in bytes.
    pub worker_stack_size: usize,
    /// Liveness watchdog.
    pub watchdog: WatchdogConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_requests_per_caller: DEFAULT_MAX_IN_FLIGHT,
            admission_allow_list: vec![
                TaskCode::UpdateListenEventFlag,
                TaskCode::PanelStatusChange,
                TaskCode::ConnectSystemCmd,
            ],
            command_queue_depth: 1024,
            control_timeout_ms: 1000,
            worker_thread_name: "ime-sched-worker".into(),
            worker_stack_size: 2 * 1024 * 1024,
            watchdog: WatchdogConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-caller in-flight budget.
    #[must_use]
    pub fn with_max_requests_per_caller(mut self, max: u32) -> Self {
        self.max_requests_per_caller = max;
        self
    }

    /// Replace the admission allow-list.
    #[must_use]
    pub fn with_admission_allow_list(mut self, codes: impl IntoIterator<Item = TaskCode>) -> Self {
        self.admission_allow_list = codes.into_iter().collect();
        self
    }

    /// Set the command queue capacity.
    #[must_use]
    pub fn with_command_queue_depth(mut self, depth: usize) -> Self {
        self.command_queue_depth = depth;
        self
    }

    /// Set the round-trip timeout for synchronous queries.
    #[must_use]
    pub fn with_control_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.control_timeout_ms = timeout_ms;
        self
    }

    /// Set the worker thread name.
    #[must_use]
    pub fn with_worker_thread_name(mut self, name: impl Into<String>) -> Self {
        self.worker_thread_name = name.into();
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub fn with_worker_stack_size(mut self, bytes: usize) -> Self {
        self.worker_stack_size = bytes;
        self
    }

    /// Replace the watchdog settings.
    #[must_use]
    pub fn with_watchdog(mut self, watchdog: WatchdogConfig) -> Self {
        self.watchdog = watchdog;
        self
    }

    /// Turn the watchdog off.
    #[must_use]
    pub fn without_watchdog(mut self) -> Self {
        self.watchdog.enabled = false;
        self
    }

    /// Validate all values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_requests_per_caller == 0 {
            return Err("max_requests_per_caller must be greater than 0".into());
        }
        if self.command_queue_depth == 0 {
            return Err("command_queue_depth must be greater than 0".into());
        }
        if self.control_timeout_ms == 0 {
            return Err("control_timeout_ms must be greater than 0".into());
        }
        if self.worker_thread_name.is_empty() {
            return Err("worker_thread_name must not be empty".into());
        }
        if self.worker_stack_size == 0 {
            return Err("worker_stack_size must be greater than 0".into());
        }
        if let Some(code) = self.admission_allow_list.iter().find(|code| {
            !matches!(
                code.class(),
                TaskClass::HigherRequest | TaskClass::NormalRequest
            )
        }) {
            return Err(format!("admission_allow_list entry {code:?} is not a request code"));
        }
        self.watchdog.validate()
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `.env`, then build configuration from `IME_SCHED_*` variables.
    ///
    /// # Errors
    ///
    /// Fails if a variable does not parse, the file named by
    /// `IME_SCHED_CONFIG` cannot be read, or the result does not validate.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build configuration from a variable lookup.
    ///
    /// `IME_SCHED_CONFIG` names a JSON file used as the base; the remaining
    /// `IME_SCHED_*` variables override single fields.
    ///
    /// # Errors
    ///
    /// Same as [`SchedulerConfig::from_env`].
    pub fn from_vars<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        let mut cfg = match var("CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(v) = var("MAX_REQUESTS_PER_CALLER") {
            cfg.max_requests_per_caller = v
                .parse()
                .with_context(|| format!("{ENV_PREFIX}MAX_REQUESTS_PER_CALLER={v}"))?;
        }
        if let Some(v) = var("COMMAND_QUEUE_DEPTH") {
            cfg.command_queue_depth = v
                .parse()
                .with_context(|| format!("{ENV_PREFIX}COMMAND_QUEUE_DEPTH={v}"))?;
        }
        if let Some(v) = var("CONTROL_TIMEOUT_MS") {
            cfg.control_timeout_ms = v
                .parse()
                .with_context(|| format!("{ENV_PREFIX}CONTROL_TIMEOUT_MS={v}"))?;
        }
        if let Some(v) = var("WORKER_THREAD_NAME") {
            cfg.worker_thread_name = v;
        }
        if let Some(v) = var("WATCHDOG_ENABLED") {
            cfg.watchdog.enabled = v
                .parse()
                .with_context(|| format!("{ENV_PREFIX}WATCHDOG_ENABLED={v}"))?;
        }
        if let Some(v) = var("WATCHDOG_TIMEOUT_MS") {
            cfg.watchdog.timeout_ms = v
                .parse()
                .with_context(|| format!("{ENV_PREFIX}WATCHDOG_TIMEOUT_MS={v}"))?;
        }
        if let Some(v) = var("WATCHDOG_ABORT_ON_STALL") {
            cfg.watchdog.abort_on_stall = v
                .parse()
                .with_context(|| format!("{ENV_PREFIX}WATCHDOG_ABORT_ON_STALL={v}"))?;
        }

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }

    fn from_file(path: &Path) -> AppResult<Self> {
        let input = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_json_str(&input)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = SchedulerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_requests_per_caller, 6);
        assert_eq!(cfg.admission_allow_list.len(), 3);
    }

    #[test]
    fn test_rejects_zero_depth() {
        let cfg = SchedulerConfig::new().with_command_queue_depth(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_non_request_allow_list() {
        let cfg = SchedulerConfig::new().with_admission_allow_list([TaskCode::ListInputMethod]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_watchdog_interval_shorter_than_timeout() {
        let cfg = SchedulerConfig::new().with_watchdog(WatchdogConfig {
            timeout_ms: 100,
            check_interval_ms: 100,
            ..WatchdogConfig::default()
        });
        assert!(cfg.validate().is_err());
        assert!(cfg.without_watchdog().validate().is_ok());
    }
}
