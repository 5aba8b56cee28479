use parking_lot::Mutex;
use pipeline_resilience_circuitbreaker::{CircuitBreaker, CircuitConfig, CircuitEvent, CircuitState};
use pipeline_resilience_core::events::{FnListener, ResilienceEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

type Transitions = Arc<Mutex<Vec<(String, CircuitState, CircuitState)>>>;

fn recording_breaker() -> (CircuitBreaker, Transitions) {
    let transitions: Transitions = Arc::new(Mutex::new(Vec::new()));
    let t = Arc::clone(&transitions);
    let breaker = CircuitBreaker::builder()
        .default_config(
            CircuitConfig::builder()
                .success_threshold(2)
                .timeout(Duration::from_millis(1000))
                .build(),
        )
        .on_state_transition(move |name, from, to| t.lock().push((name.to_string(), from, to)))
        .build();
    (breaker, transitions)
}

#[tokio::test(start_paused = true)]
async fn full_cycle_reports_each_transition() {
    let (breaker, transitions) = recording_breaker();

    for _ in 0..5 {
        breaker.record_error("llm-api");
    }
    sleep(Duration::from_millis(1001)).await;
    breaker.record_success("llm-api");
    breaker.record_success("llm-api");

    let seen = transitions.lock().clone();
    assert_eq!(
        seen,
        vec![
            ("llm-api".to_string(), CircuitState::Closed, CircuitState::Open),
            ("llm-api".to_string(), CircuitState::Open, CircuitState::HalfOpen),
            ("llm-api".to_string(), CircuitState::HalfOpen, CircuitState::Closed),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn rejected_calls_are_reported() {
    let rejected = Arc::new(Mutex::new(Vec::new()));
    let r = Arc::clone(&rejected);
    let breaker = CircuitBreaker::builder()
        .on_call_rejected(move |name| r.lock().push(name.to_string()))
        .build();

    assert!(breaker.try_acquire("fetch"));
    breaker.open("fetch");
    assert!(!breaker.try_acquire("fetch"));
    assert!(!breaker.try_acquire("fetch"));

    assert_eq!(*rejected.lock(), vec!["fetch".to_string(), "fetch".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn reset_is_announced() {
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let k = Arc::clone(&kinds);
    let breaker = CircuitBreaker::builder()
        .listener(FnListener::new(move |event: &CircuitEvent| {
            k.lock().push(event.event_type())
        }))
        .build();

    breaker.open("disk");
    breaker.reset("disk");
    // Resetting an unknown circuit is still announced
    breaker.reset("never-used");

    assert_eq!(*kinds.lock(), vec!["opened", "reset", "reset"]);
}

#[tokio::test(start_paused = true)]
async fn panicking_listener_does_not_break_the_breaker() {
    let (breaker, transitions) = recording_breaker();
    breaker.add_listener(FnListener::new(|_: &CircuitEvent| panic!("listener bug")));

    for _ in 0..5 {
        breaker.record_error("llm-api");
    }

    assert!(breaker.is_open("llm-api"));
    assert_eq!(transitions.lock().len(), 1);
    // The circuit lock was released before listeners ran
    breaker.close("llm-api");
    assert_eq!(breaker.state("llm-api"), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn listener_may_call_back_into_the_breaker() {
    let seen = Arc::new(Mutex::new(None));
    let slot = Arc::new(Mutex::new(None::<CircuitBreaker>));

    let s = Arc::clone(&seen);
    let b = Arc::clone(&slot);
    let breaker = CircuitBreaker::builder()
        .on_state_transition(move |name, _, _| {
            if let Some(breaker) = b.lock().as_ref() {
                *s.lock() = Some(breaker.statistics(name).state);
            }
        })
        .build();
    *slot.lock() = Some(breaker.clone());

    breaker.open("disk");
    assert_eq!(*seen.lock(), Some(CircuitState::Open));

    slot.lock().take();
}

#[tokio::test(start_paused = true)]
async fn monitor_reports_health_until_stopped() {
    let reports = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&reports);
    let breaker = CircuitBreaker::builder()
        .on_health(move |stats| {
            assert_eq!(stats.name, "llm-api");
            r.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    breaker.record_error("llm-api");
    breaker.start_monitoring(Duration::from_secs(30));

    sleep(Duration::from_secs(95)).await;
    assert_eq!(reports.load(Ordering::SeqCst), 3);

    breaker.stop_monitoring();
    assert!(!breaker.is_monitoring());
    sleep(Duration::from_secs(60)).await;
    assert_eq!(reports.load(Ordering::SeqCst), 3);
}
