use futures::future::BoxFuture;
use parking_lot::Mutex;
use pipeline_resilience::Resilience;
use pipeline_resilience::circuitbreaker::{CircuitBreaker, CircuitConfig};
use pipeline_resilience::core::BoxError;
use pipeline_resilience::recovery::{
    ErrorContext, ErrorKind, RecoveryHandler, RecoveryManager, RecoveryStrategy, Severity,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct Cache;

impl RecoveryHandler<u32> for Cache {
    fn retry(&self, _: ErrorContext, _: u32) -> BoxFuture<'static, Result<Option<u32>, BoxError>> {
        Box::pin(async { Err("upstream still failing".into()) })
    }

    fn fallback(&self, _: ErrorContext) -> BoxFuture<'static, Result<Option<u32>, BoxError>> {
        Box::pin(async { Ok(Some(42)) })
    }
}

#[tokio::test(start_paused = true)]
async fn high_severity_alerts_then_falls_back() {
    init_tracing();
    let alerts = Arc::new(Mutex::new(Vec::new()));
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let a = Arc::clone(&alerts);
    let o = Arc::clone(&outcomes);

    let manager = RecoveryManager::<u32>::builder()
        .handler(Cache)
        .on_alert(move |agent, operation, severity| {
            a.lock().push((agent.to_string(), operation.to_string(), severity))
        })
        .on_strategy_outcome(move |strategy, success| o.lock().push((strategy, success)))
        .build();

    let result = manager
        .handle_error(ErrorContext::new(
            "analyzer",
            "summarize",
            "model overloaded",
            Severity::High,
        ))
        .await;

    assert!(result.success);
    assert_eq!(result.strategy, RecoveryStrategy::Fallback);
    assert_eq!(result.result, Some(42));
    assert_eq!(
        *alerts.lock(),
        vec![("analyzer".to_string(), "summarize".to_string(), Severity::High)]
    );
    assert_eq!(
        *outcomes.lock(),
        vec![(RecoveryStrategy::Alert, false), (RecoveryStrategy::Fallback, true)]
    );

    let stats = manager.statistics();
    assert_eq!(stats.total_errors, 1);
    assert_eq!(stats.recovered, 1);
    assert_eq!(stats.by_strategy.get(&RecoveryStrategy::Fallback), Some(&1));
}

#[tokio::test(start_paused = true)]
async fn low_severity_retries_then_skips() {
    let manager = RecoveryManager::<u32>::builder().handler(Cache).build();
    let start = Instant::now();

    let result = manager
        .handle_error(ErrorContext::new("collector", "fetch", "HTTP 502", Severity::Low))
        .await;

    assert!(result.success);
    assert_eq!(result.strategy, RecoveryStrategy::Skip);
    assert_eq!(result.attempts, 0);
    assert!(result.result.is_none());

    // 1000 + 1500 + 2250 ms of backoff before the three retries
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(4750), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(4800), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn transient_errors_are_classified_medium() {
    let manager = RecoveryManager::<u32>::builder().handler(Cache).build();

    let context = ErrorContext::classified("drafter", "draft", "socket reset", ErrorKind::Transient);
    assert_eq!(context.severity, Severity::Medium);

    // MEDIUM retries five times before its fallback wins
    let result = manager.handle_error(context).await;
    assert!(result.success);
    assert_eq!(result.strategy, RecoveryStrategy::Fallback);
    assert_eq!(result.result, Some(42));
}

#[tokio::test(start_paused = true)]
async fn critical_errors_request_shutdown() {
    let shutdowns = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&shutdowns);
    let manager = RecoveryManager::<u32>::builder()
        .handler(Cache)
        .on_shutdown_required(move |agent, operation| {
            s.lock().push(format!("{agent}/{operation}"))
        })
        .build();

    let result = manager
        .handle_error(
            ErrorContext::new("publisher", "write", "disk full", Severity::Critical).with_attempts(2),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.strategy, RecoveryStrategy::Skip);
    assert_eq!(result.attempts, 2);
    assert_eq!(*shutdowns.lock(), vec!["publisher/write".to_string()]);

    let err = result.into_result::<BoxError>().unwrap_err();
    assert!(err.is_unrecovered());
    assert!(err.to_string().contains("disk full"));
    assert_eq!(manager.statistics().failed, 1);
}

#[tokio::test(start_paused = true)]
async fn pipeline_stage_trips_its_circuit() {
    init_tracing();
    let breaker = CircuitBreaker::builder()
        .circuit(
            "llm-api",
            CircuitConfig::builder().timeout(Duration::from_secs(30)).build(),
        )
        .build();
    let resilience = Resilience::builder()
        .breaker(breaker)
        .recovery(RecoveryManager::<u32>::builder().handler(Cache).build())
        .build();

    for _ in 0..5 {
        let value = resilience
            .execute("llm-api", "analyzer", "summarize", Severity::High, || async {
                Err::<u32, _>(std::io::Error::other("503"))
            })
            .await
            .unwrap();
        assert_eq!(value, Some(42));
    }
    assert!(resilience.breaker().is_open("llm-api"));

    let err = resilience
        .execute("llm-api", "analyzer", "summarize", Severity::High, || async {
            Ok::<u32, std::io::Error>(1)
        })
        .await
        .unwrap_err();
    assert!(err.is_circuit_open());

    let stats = resilience.statistics();
    assert_eq!(stats.circuits.len(), 1);
    assert_eq!(stats.recovery.total_errors, 5);
    assert_eq!(stats.recovery.history_len, 5);

    resilience.shutdown();
    assert!(!resilience.breaker().has_pending_timer("llm-api"));
}
