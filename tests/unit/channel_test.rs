//! Tests for response transports

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ime_task_scheduler::core::{ResponseChannel, ResultCode, SchedulerError};
use ime_task_scheduler::infra::channel::{FnChannel, InMemoryChannel};
use parking_lot::Mutex;

#[test]
fn test_memory_channel_records_in_order() {
    let channel = InMemoryChannel::new();
    channel.deliver(1, ResultCode::OK, vec![1]).unwrap();
    channel.deliver(2, ResultCode::TASK_TIMEOUT, Vec::new()).unwrap();

    let responses = channel.responses();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].request_id, 1);
    assert_eq!(responses[0].payload, vec![1]);
    assert_eq!(responses[1].code, ResultCode::TASK_TIMEOUT);
}

#[test]
fn test_memory_channel_take_drains() {
    let channel = InMemoryChannel::new();
    channel.deliver(1, ResultCode::OK, Vec::new()).unwrap();
    assert_eq!(channel.take().len(), 1);
    assert!(channel.is_empty());
}

#[test]
fn test_memory_channel_fetch_limit() {
    let channel = InMemoryChannel::new();
    for id in 0..5 {
        channel.deliver(id, ResultCode::OK, Vec::new()).unwrap();
    }
    assert_eq!(channel.fetch(None, 3).len(), 3);
    assert_eq!(channel.fetch(Some(0), 10).len(), 5);
    assert!(channel.fetch(Some(u128::MAX), 10).is_empty());
}

#[test]
fn test_memory_channel_closed_refuses() {
    let channel = InMemoryChannel::new();
    channel.close();
    assert!(!channel.is_alive());
    let err = channel.deliver(1, ResultCode::OK, Vec::new()).unwrap_err();
    assert!(matches!(err, SchedulerError::Delivery(_)));
    assert!(channel.is_empty());
}

#[test]
fn test_memory_channel_wait_for_other_thread() {
    let channel = Arc::new(InMemoryChannel::new());
    let sender = Arc::clone(&channel);
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        sender.deliver(9, ResultCode(999), Vec::new()).unwrap();
    });

    let response = channel.wait_for(9, Duration::from_secs(2)).unwrap();
    assert_eq!(response.code, ResultCode(999));
    handle.join().unwrap();
}

#[test]
fn test_memory_channel_wait_for_times_out() {
    let channel = InMemoryChannel::new();
    assert!(channel.wait_for(1, Duration::from_millis(20)).is_none());
    assert!(!channel.wait_for_count(1, Duration::from_millis(20)));
}

#[test]
fn test_fn_channel_forwards() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let channel = FnChannel::new(move |id, code, _payload| sink.lock().push((id, code)));
    channel.deliver(3, ResultCode::TASK_DROPPED, Vec::new()).unwrap();
    assert!(channel.is_alive());
    assert_eq!(*seen.lock(), vec![(3, ResultCode::TASK_DROPPED)]);
}
