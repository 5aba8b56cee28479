use pipeline_resilience_circuitbreaker::{CircuitBreaker, CircuitConfig, CircuitState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reports_are_not_lost() {
    // A rate can never exceed 1.0, so this circuit stays closed
    let breaker = CircuitBreaker::builder()
        .circuit("store", CircuitConfig::builder().error_threshold(1.0).build())
        .build();

    let mut handles = Vec::new();
    for task in 0..8 {
        let breaker = breaker.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..100 {
                if (task + i) % 2 == 0 {
                    breaker.record_success("store");
                } else {
                    breaker.record_error("store");
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = breaker.statistics("store");
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.metrics.success_count + stats.metrics.error_count, 800);
    assert_eq!(stats.metrics.success_count, 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_failures_open_the_circuit_once() {
    let opened = Arc::new(AtomicUsize::new(0));
    let o = Arc::clone(&opened);
    let breaker = CircuitBreaker::builder()
        .on_state_transition(move |_, _, to| {
            if to == CircuitState::Open {
                o.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let breaker = breaker.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..25 {
                breaker.record_error("llm-api");
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(breaker.is_open("llm-api"));
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(breaker.statistics("llm-api").metrics.error_count, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn circuits_on_different_keys_do_not_interfere() {
    let breaker = CircuitBreaker::default();

    let failing = {
        let breaker = breaker.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                breaker.record_error("llm-api");
            }
        })
    };
    let healthy = {
        let breaker = breaker.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                breaker.record_success("disk");
            }
        })
    };
    failing.await.unwrap();
    healthy.await.unwrap();

    assert!(breaker.is_open("llm-api"));
    assert_eq!(breaker.state("disk"), CircuitState::Closed);
    assert_eq!(breaker.error_rate("disk"), 0.0);
}
