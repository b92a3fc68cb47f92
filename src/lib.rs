//! # IME Task Scheduler
//!
//! The task-serialization core of an input-method service: requests from
//! many concurrent callers (remote clients, the active input-method process,
//! system lifecycle events) are executed one at a time, in priority order,
//! on a single serial worker.
//!
//! ## Model
//!
//! - A [`Task`](core::Task) binds a caller identity and a response channel
//!   to an [`Action`](core::Action) tree. Its [`TaskCode`](core::TaskCode)
//!   decides its priority class.
//! - Action trees may pause in a [`WaitAction`](core::WaitAction) and later
//!   resume at the exact point of suspension, when a completion id arrives
//!   or the wait times out.
//! - At most one task is current. Higher classes preempt or queue according
//!   to fixed rules; read-only and lifecycle-report classes run beside a
//!   paused task.
//! - Every posted task is answered exactly once, even when it is dropped.
//! - [`RequesterManager`](core::RequesterManager) limits how many tasks each
//!   caller process may have in flight.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ime_task_scheduler::builders::SchedulerBuilder;
//! use ime_task_scheduler::core::{
//!     Action, CallerInfo, PauseKind, ResultCode, Task, TaskCode, WaitAction,
//! };
//! use ime_task_scheduler::infra::channel::InMemoryChannel;
//!
//! let channel = Arc::new(InMemoryChannel::new());
//! let scheduler = SchedulerBuilder::new()
//!     .channel(1, channel.clone())
//!     .build()
//!     .unwrap();
//!
//! // Switch input methods and wait for the new one to report in.
//! let switch = Action::new(|_ctx| ResultCode::OK).then(WaitAction::for_ime(
//!     PauseKind::AwaitingImeStart,
//!     "pkg.keyboard",
//!     Duration::from_secs(2),
//! ));
//! let caller = CallerInfo::new(1, "pkg.settings").with_request_id(100);
//! scheduler
//!     .post(Task::new(TaskCode::SwitchInputMethod, caller, switch).with_channel(channel.clone()))
//!     .unwrap();
//!
//! // The input method reports that it started.
//! scheduler
//!     .try_resume(PauseKind::AwaitingImeStart, CallerInfo::new(2, "pkg.keyboard"))
//!     .unwrap();
//!
//! let response = channel.wait_for(100, Duration::from_secs(2)).unwrap();
//! assert_eq!(response.code, ResultCode::OK);
//! scheduler.shutdown();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Tasks, action trees, admission control and the priority scheduler.
pub mod core;
/// Scheduler, worker and watchdog configuration.
pub mod config;
/// Builders to construct a scheduler from configuration.
pub mod builders;
/// Response transports.
pub mod infra;
/// Shared utilities.
pub mod util;
