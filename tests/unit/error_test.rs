//! Tests for error types

use ime_task_scheduler::core::SchedulerError;

#[test]
fn test_null_task_error() {
    let err = SchedulerError::NullTask;
    assert_eq!(format!("{}", err), "null task");
}

#[test]
fn test_post_failed_error() {
    let err = SchedulerError::PostFailed("scheduler is shut down".to_string());
    assert_eq!(format!("{}", err), "post failed: scheduler is shut down");
}

#[test]
fn test_pend_failed_error() {
    let err = SchedulerError::PendFailed("no current task".to_string());
    assert_eq!(format!("{}", err), "pend failed: no current task");
}

#[test]
fn test_too_many_requests_error() {
    let err = SchedulerError::TooManyRequests { pid: 42, in_flight: 6 };
    assert_eq!(format!("{}", err), "too many requests: pid 42 has 6 in flight");
}

#[test]
fn test_not_registered_error() {
    let err = SchedulerError::NotRegistered(7);
    assert_eq!(format!("{}", err), "no response channel registered for pid 7");
}

#[test]
fn test_channel_conflict_error() {
    let err = SchedulerError::ChannelConflict(7);
    assert_eq!(format!("{}", err), "pid 7 already has a live response channel");
}

#[test]
fn test_invalid_config_error() {
    let err = SchedulerError::InvalidConfig("command_queue_depth must be greater than 0".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: command_queue_depth must be greater than 0"
    );
}

#[test]
fn test_errors_convert_into_anyhow() {
    let result: ime_task_scheduler::core::AppResult<()> = Err(SchedulerError::NullTask.into());
    let err = result.unwrap_err();
    assert!(err.downcast_ref::<SchedulerError>().is_some());
}
