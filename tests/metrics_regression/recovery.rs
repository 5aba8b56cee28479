//! Recovery manager metrics regression tests

use super::helpers::*;
use pipeline_resilience_recovery::{ErrorContext, RecoveryManager, Severity};
use serial_test::serial;

#[tokio::test(start_paused = true)]
#[serial]
async fn recovery_metrics_exist() {
    init_recorder();

    let manager = RecoveryManager::<u32>::builder().name("test_recovery").build();

    // LOW: RETRY fails without a handler, SKIP succeeds
    manager
        .handle_error(ErrorContext::new("collector", "fetch", "HTTP 502", Severity::Low))
        .await;
    // CRITICAL: ALERT then SHUTDOWN
    manager
        .handle_error(ErrorContext::new("publisher", "write", "disk full", Severity::Critical))
        .await;

    assert_counter_exists("recovery_errors_total");
    assert_metric_has_label("recovery_errors_total", "manager", "test_recovery");
    assert_metric_has_label("recovery_errors_total", "severity", "LOW");
    assert_metric_has_label("recovery_errors_total", "severity", "CRITICAL");

    assert_counter_exists("recovery_strategy_total");
    assert_metric_has_label("recovery_strategy_total", "strategy", "RETRY");
    assert_metric_has_label("recovery_strategy_total", "strategy", "SKIP");
    assert_metric_has_label("recovery_strategy_total", "outcome", "success");
    assert_metric_has_label("recovery_strategy_total", "outcome", "failure");

    assert_counter_exists("recovery_alerts_total");
    assert_metric_has_label("recovery_alerts_total", "severity", "CRITICAL");
}
