//! Tests for configuration validation and loading

use std::collections::HashMap;
use std::io::Write;

use ime_task_scheduler::config::{SchedulerConfig, WatchdogConfig, ENV_PREFIX};
use ime_task_scheduler::core::TaskCode;

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), (*v).to_string()))
        .collect()
}

#[test]
fn test_scheduler_config_defaults() {
    let config = SchedulerConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.max_requests_per_caller, 6);
    assert_eq!(config.command_queue_depth, 1024);
    assert!(config.admission_allow_list.contains(&TaskCode::PanelStatusChange));
    assert!(config.watchdog.enabled);
}

#[test]
fn test_scheduler_config_invalid_budget() {
    let invalid = SchedulerConfig::new().with_max_requests_per_caller(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_control_timeout() {
    let invalid = SchedulerConfig::new().with_control_timeout_ms(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_thread_name() {
    let invalid = SchedulerConfig::new().with_worker_thread_name("");
    assert!(invalid.validate().is_err());
}

#[test]
fn test_watchdog_config_validation() {
    let valid = WatchdogConfig {
        enabled: true,
        timeout_ms: 2_000,
        check_interval_ms: 100,
        abort_on_stall: false,
    };
    assert!(valid.validate().is_ok());

    let invalid = WatchdogConfig {
        timeout_ms: 0,
        ..valid.clone()
    };
    assert!(invalid.validate().is_err());

    let disabled = WatchdogConfig {
        enabled: false,
        ..invalid
    };
    assert!(disabled.validate().is_ok());
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "max_requests_per_caller": 3,
        "admission_allow_list": ["panel_status_change"],
        "watchdog": { "enabled": false }
    }"#;
    let config = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(config.max_requests_per_caller, 3);
    assert_eq!(config.admission_allow_list, vec![TaskCode::PanelStatusChange]);
    assert!(!config.watchdog.enabled);
    assert_eq!(config.command_queue_depth, 1024);
}

#[test]
fn test_config_from_json_rejects_invalid() {
    assert!(SchedulerConfig::from_json_str("{ not json").is_err());
    assert!(SchedulerConfig::from_json_str(r#"{ "command_queue_depth": 0 }"#).is_err());
    assert!(SchedulerConfig::from_json_str(r#"{ "admission_allow_list": ["list_input_method"] }"#).is_err());
}

#[test]
fn test_config_from_vars_overrides() {
    let env = vars(&[
        ("MAX_REQUESTS_PER_CALLER", "2"),
        ("CONTROL_TIMEOUT_MS", "250"),
        ("WORKER_THREAD_NAME", "ime-test-worker"),
        ("WATCHDOG_ENABLED", "false"),
    ]);
    let config = SchedulerConfig::from_vars(|key| env.get(key).cloned()).unwrap();
    assert_eq!(config.max_requests_per_caller, 2);
    assert_eq!(config.control_timeout_ms, 250);
    assert_eq!(config.worker_thread_name, "ime-test-worker");
    assert!(!config.watchdog.enabled);
}

#[test]
fn test_config_from_vars_rejects_garbage() {
    let env = vars(&[("COMMAND_QUEUE_DEPTH", "many")]);
    let err = SchedulerConfig::from_vars(|key| env.get(key).cloned()).unwrap_err();
    assert!(format!("{:#}", err).contains("COMMAND_QUEUE_DEPTH=many"));
}

#[test]
fn test_config_from_vars_reads_file_then_overrides() {
    let path = std::env::temp_dir().join(format!("ime-sched-config-{}.json", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    write!(file, r#"{{ "max_requests_per_caller": 4, "command_queue_depth": 16 }}"#).unwrap();
    drop(file);

    let env = vars(&[
        ("CONFIG", path.to_str().unwrap()),
        ("COMMAND_QUEUE_DEPTH", "32"),
    ]);
    let config = SchedulerConfig::from_vars(|key| env.get(key).cloned()).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.max_requests_per_caller, 4);
    assert_eq!(config.command_queue_depth, 32);
}

#[test]
fn test_config_from_vars_missing_file() {
    let env = vars(&[("CONFIG", "/nonexistent/ime-sched.json")]);
    assert!(SchedulerConfig::from_vars(|key| env.get(key).cloned()).is_err());
}
