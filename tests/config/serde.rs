use pipeline_resilience_circuitbreaker::{CircuitConfig, CircuitConfigUpdate, CircuitState};
use pipeline_resilience_recovery::{
    PolicyTable, RecoveryConfig, RecoveryPolicy, RecoveryStrategy, Severity,
};
use serde_json::json;
use std::time::Duration;

#[test]
fn circuit_config_uses_milliseconds() {
    let config = CircuitConfig::builder()
        .error_threshold(0.25)
        .timeout(Duration::from_millis(1500))
        .build();

    let value = serde_json::to_value(config).unwrap();
    assert_eq!(value["timeout"], json!(1500));
    assert_eq!(value["error_threshold"], json!(0.25));

    let back: CircuitConfig = serde_json::from_value(value).unwrap();
    assert_eq!(back, config);
}

#[test]
fn partial_circuit_config_fills_defaults() {
    let config: CircuitConfig = serde_json::from_str(r#"{"success_threshold": 2}"#).unwrap();
    assert_eq!(config.success_threshold, 2);
    assert_eq!(config.timeout, Duration::from_secs(60));
    assert_eq!(config.half_open_requests, 3);
}

#[test]
fn config_update_only_names_changed_fields() {
    let update: CircuitConfigUpdate = serde_json::from_str(r#"{"timeout": 5000}"#).unwrap();
    assert_eq!(update.timeout, Some(Duration::from_secs(5)));
    assert!(update.error_threshold.is_none());

    let merged = CircuitConfig::default().merged(&update);
    assert_eq!(merged.timeout, Duration::from_secs(5));
    assert_eq!(merged.error_threshold, 0.5);
}

#[test]
fn states_and_severities_are_upper_case() {
    assert_eq!(serde_json::to_value(CircuitState::HalfOpen).unwrap(), json!("HALF_OPEN"));
    assert_eq!(serde_json::to_value(Severity::High).unwrap(), json!("HIGH"));
    assert_eq!(serde_json::to_value(RecoveryStrategy::Fallback).unwrap(), json!("FALLBACK"));

    let severity: Severity = serde_json::from_str(r#""CRITICAL""#).unwrap();
    assert_eq!(severity, Severity::Critical);
}

#[test]
fn policy_round_trips() {
    let policy = RecoveryPolicy::defaults_for(Severity::Medium);
    let value = serde_json::to_value(&policy).unwrap();
    assert_eq!(value["strategies"], json!(["RETRY", "FALLBACK"]));
    assert_eq!(value["max_attempts"], json!(5));

    let back: RecoveryPolicy = serde_json::from_value(value).unwrap();
    assert_eq!(back, policy);
}

#[test]
fn policy_table_round_trips() {
    let table = PolicyTable::default();
    let json = serde_json::to_string(&table).unwrap();
    let back: PolicyTable = serde_json::from_str(&json).unwrap();
    assert_eq!(back, table);
}

#[test]
fn recovery_config_defaults_when_fields_missing() {
    let config: RecoveryConfig =
        serde_json::from_str(r#"{"name": "pipeline", "base_delay": 250}"#).unwrap();

    assert_eq!(config.name, "pipeline");
    assert_eq!(config.base_delay, Duration::from_millis(250));
    assert_eq!(config.max_delay, Duration::from_millis(30_000));
    assert_eq!(config.fallback_deadline, Duration::from_secs(10));
    assert_eq!(config.history_capacity, 1000);
    assert_eq!(config.history_trim_to, 500);
}
