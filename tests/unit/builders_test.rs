//! Tests for builder modules

use std::sync::Arc;

use ime_task_scheduler::builders::SchedulerBuilder;
use ime_task_scheduler::config::SchedulerConfig;
use ime_task_scheduler::core::{RequesterManager, SchedulerError};
use ime_task_scheduler::infra::channel::InMemoryChannel;

#[test]
fn test_scheduler_builder_defaults() {
    let scheduler = SchedulerBuilder::new().without_watchdog().build().unwrap();
    assert_eq!(scheduler.config().max_requests_per_caller, 6);
    assert!(scheduler.requesters().is_empty());
    assert!(!scheduler.is_shutdown());
    scheduler.shutdown();
    assert!(scheduler.is_shutdown());
}

#[test]
fn test_scheduler_builder_from_config() {
    let config = SchedulerConfig::new()
        .with_worker_thread_name("ime-builder-test")
        .without_watchdog();
    let scheduler = SchedulerBuilder::from_config(config).build().unwrap();
    assert_eq!(scheduler.config().worker_thread_name, "ime-builder-test");
    scheduler.shutdown();
}

#[test]
fn test_scheduler_builder_registers_channels() {
    let requesters = Arc::new(RequesterManager::new(2));
    let scheduler = SchedulerBuilder::new()
        .without_watchdog()
        .requesters(Arc::clone(&requesters))
        .channel(1, Arc::new(InMemoryChannel::new()))
        .channel(2, Arc::new(InMemoryChannel::new()))
        .build()
        .unwrap();
    assert_eq!(requesters.len(), 2);
    assert_eq!(requesters.in_flight(1), Some(0));
    scheduler.shutdown();
}

#[test]
fn test_scheduler_builder_channel_conflict() {
    let result = SchedulerBuilder::new()
        .without_watchdog()
        .channel(1, Arc::new(InMemoryChannel::new()))
        .channel(1, Arc::new(InMemoryChannel::new()))
        .build();
    assert!(matches!(result, Err(SchedulerError::ChannelConflict(1))));
}

#[test]
fn test_scheduler_builder_invalid_budget() {
    let result = SchedulerBuilder::new().max_requests_per_caller(0).build();
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
}
