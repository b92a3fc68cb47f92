//! Tests for per-caller admission control

use std::sync::Arc;

use ime_task_scheduler::core::{RequesterManager, SchedulerError, DEFAULT_MAX_IN_FLIGHT};
use ime_task_scheduler::infra::channel::InMemoryChannel;

#[test]
fn test_unregistered_caller_rejected() {
    let manager = RequesterManager::default();
    assert_eq!(manager.max_in_flight(), DEFAULT_MAX_IN_FLIGHT);
    assert!(matches!(
        manager.get_requester(5),
        Err(SchedulerError::NotRegistered(5))
    ));
}

#[test]
fn test_budget_exhaustion_and_recovery() {
    let manager = RequesterManager::new(2);
    manager.add_channel(5, Arc::new(InMemoryChannel::new())).unwrap();

    manager.task_in(5);
    assert!(manager.get_requester(5).is_ok());
    manager.task_in(5);
    assert_eq!(
        manager.get_requester(5).err(),
        Some(SchedulerError::TooManyRequests { pid: 5, in_flight: 2 })
    );

    manager.task_out(5);
    assert!(manager.get_requester(5).is_ok());
}

#[test]
fn test_task_out_never_underflows() {
    let manager = RequesterManager::default();
    manager.add_channel(5, Arc::new(InMemoryChannel::new())).unwrap();
    manager.task_out(5);
    assert_eq!(manager.in_flight(5), Some(0));
}

#[test]
fn test_dead_channel_replaced() {
    let manager = RequesterManager::default();
    let first = Arc::new(InMemoryChannel::new());
    manager.add_channel(5, first.clone()).unwrap();
    assert!(matches!(
        manager.add_channel(5, Arc::new(InMemoryChannel::new())),
        Err(SchedulerError::ChannelConflict(5))
    ));

    first.close();
    manager.add_channel(5, Arc::new(InMemoryChannel::new())).unwrap();
    assert_eq!(manager.len(), 1);
}

#[test]
fn test_process_death_forgets_caller() {
    let manager = RequesterManager::default();
    manager.add_channel(5, Arc::new(InMemoryChannel::new())).unwrap();
    manager.task_in(5);
    manager.on_process_died(5);
    assert!(manager.is_empty());
    assert_eq!(manager.in_flight(5), None);
}
