use pipeline_resilience_circuitbreaker::{
    CircuitBreaker, CircuitBreakerLayer, CircuitConfig, CircuitState,
};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tower::{Service, ServiceBuilder, ServiceExt, service_fn};

fn breaker(success_threshold: u32, half_open_requests: u32) -> CircuitBreaker {
    CircuitBreaker::builder()
        .circuit(
            "llm-api",
            CircuitConfig::builder()
                .success_threshold(success_threshold)
                .half_open_requests(half_open_requests)
                .timeout(Duration::from_millis(500))
                .build(),
        )
        .build()
}

#[tokio::test(start_paused = true)]
async fn single_error_reopens_regardless_of_success_threshold() {
    let breaker = breaker(3, 3);
    breaker.half_open("llm-api");

    breaker.record_success("llm-api");
    breaker.record_success("llm-api");
    breaker.record_error("llm-api");

    assert_eq!(breaker.state("llm-api"), CircuitState::Open);
    assert!(breaker.has_pending_timer("llm-api"));
}

#[tokio::test(start_paused = true)]
async fn closing_resets_consecutive_counters() {
    let breaker = breaker(3, 3);
    breaker.half_open("llm-api");

    for _ in 0..3 {
        breaker.record_success("llm-api");
    }

    let stats = breaker.statistics("llm-api");
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.metrics.consecutive_successes, 0);
    assert_eq!(stats.metrics.consecutive_errors, 0);
}

#[tokio::test(start_paused = true)]
async fn admission_is_capped_while_trials_are_in_flight() {
    let breaker = breaker(5, 2);
    breaker.open("llm-api");
    assert!(!breaker.try_acquire("llm-api"));

    sleep(Duration::from_millis(501)).await;
    assert!(breaker.is_half_open("llm-api"));

    assert!(breaker.try_acquire("llm-api"));
    assert!(breaker.try_acquire("llm-api"));
    assert!(!breaker.try_acquire("llm-api"));

    // Reporting an outcome frees a trial slot
    breaker.record_success("llm-api");
    assert!(breaker.try_acquire("llm-api"));
    assert!(!breaker.try_acquire("llm-api"));
}

#[tokio::test(start_paused = true)]
async fn record_calls_are_not_gated_by_admission() {
    let breaker = breaker(2, 1);
    breaker.half_open("llm-api");

    assert!(breaker.try_acquire("llm-api"));
    assert!(!breaker.try_acquire("llm-api"));

    // Callers not using try_acquire still drive the state machine
    breaker.record_success("llm-api");
    breaker.record_success("llm-api");
    assert_eq!(breaker.state("llm-api"), CircuitState::Closed);
    assert!(breaker.try_acquire("llm-api"));
}

#[tokio::test(start_paused = true)]
async fn manual_transitions_work_on_unknown_circuits() {
    let breaker = CircuitBreaker::default();

    breaker.half_open("disk");
    assert!(breaker.is_half_open("disk"));

    breaker.close("disk");
    assert_eq!(breaker.state("disk"), CircuitState::Closed);

    breaker.open("disk");
    assert!(breaker.is_open("disk"));
    assert!(breaker.has_pending_timer("disk"));
}

#[tokio::test(start_paused = true)]
async fn cancelled_layer_call_frees_its_trial_slot() {
    let breaker = breaker(2, 1);
    breaker.half_open("llm-api");

    let mut service = ServiceBuilder::new()
        .layer(CircuitBreakerLayer::new(breaker.clone(), "llm-api"))
        .service(service_fn(|_: ()| async {
            std::future::pending::<()>().await;
            Ok::<_, std::io::Error>(())
        }));

    let call = service.ready().await.unwrap().call(());
    assert!(timeout(Duration::from_millis(10), call).await.is_err());

    // The abandoned call reported nothing and the next trial is admitted
    assert!(breaker.is_half_open("llm-api"));
    assert_eq!(breaker.statistics("llm-api").metrics.success_count, 0);
    assert!(breaker.try_acquire("llm-api"));
}

#[tokio::test(start_paused = true)]
async fn dropped_permit_frees_its_trial_slot() {
    let breaker = breaker(2, 1);
    breaker.half_open("llm-api");

    let permit = breaker.acquire("llm-api").unwrap();
    assert!(permit.is_trial());
    assert!(breaker.acquire("llm-api").is_none());

    drop(permit);
    let permit = breaker.acquire("llm-api").unwrap();
    permit.record_success();
    assert_eq!(breaker.statistics("llm-api").metrics.consecutive_successes, 1);
}

#[tokio::test(start_paused = true)]
async fn permit_from_an_earlier_half_open_period_does_not_free_a_new_slot() {
    let breaker = breaker(2, 1);
    breaker.half_open("llm-api");
    let stale = breaker.acquire("llm-api").unwrap();

    breaker.open("llm-api");
    breaker.half_open("llm-api");
    let current = breaker.acquire("llm-api").unwrap();

    drop(stale);
    assert!(breaker.acquire("llm-api").is_none());

    drop(current);
    assert!(breaker.acquire("llm-api").is_some());
}

#[tokio::test(start_paused = true)]
async fn closed_circuit_permits_hold_no_trial_slot() {
    let breaker = breaker(2, 1);

    let permit = breaker.acquire("llm-api").unwrap();
    assert!(!permit.is_trial());
    assert_eq!(permit.name(), "llm-api");
    permit.record_error();
    assert_eq!(breaker.statistics("llm-api").metrics.error_count, 1);
}
