//! Tests for utility functions

use ime_task_scheduler::core::{TaskClass, TaskCode};
use ime_task_scheduler::util::{init_tracing, now_ms, SeqGenerator};

#[test]
fn test_seq_ids_increase() {
    let seq = SeqGenerator::new();
    let first = seq.next_id();
    let second = seq.next_id();
    assert_eq!(first, 1);
    assert!(second > first);
}

#[test]
fn test_now_ms_is_monotone_enough() {
    let before = now_ms();
    let after = now_ms();
    assert!(before > 0);
    assert!(after >= before);
}

#[test]
fn test_init_tracing_twice() {
    init_tracing();
    init_tracing();
}

#[test]
fn test_class_service_order() {
    assert!(TaskClass::CriticalChange < TaskClass::SwitchIme);
    assert!(TaskClass::SwitchIme < TaskClass::HigherRequest);
    assert!(TaskClass::HigherRequest < TaskClass::NormalRequest);
    assert!(TaskClass::NormalRequest < TaskClass::Query);
    assert!(TaskClass::Query < TaskClass::Resume);
    assert!(TaskClass::Resume < TaskClass::Inner);
}

#[test]
fn test_task_code_raw_round_trip() {
    for code in TaskCode::ALL {
        assert_eq!(TaskCode::try_from(code.raw()), Ok(code));
    }
}
