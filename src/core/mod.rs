//! Core scheduling abstractions: tasks, action trees, admission control and
//! the priority scheduler.

pub mod action;
pub mod caller;
pub mod error;
pub(crate) mod outbox;
pub mod requester;
pub mod response;
pub mod scheduler;
pub mod task;
pub mod task_code;
pub mod task_manager;
pub mod watchdog;
pub(crate) mod worker;

pub use action::{Action, ActionContext, ResultHook, WaitAction, WorkFn};
pub use caller::{CallerInfo, PauseInfo, PauseKind};
pub use error::{AppResult, SchedulerError};
pub use requester::{RequesterManager, DEFAULT_MAX_IN_FLIGHT};
pub use response::{RequestId, Response, ResponseChannel, ResultCode};
pub use scheduler::Scheduler;
pub use task::{Task, TaskState};
pub use task_code::{TaskClass, TaskCode};
pub use task_manager::{CurrentTask, SchedulerStats, TaskManager};
pub use watchdog::{Heartbeat, Watchdog};
