use pipeline_resilience_circuitbreaker::{
    CircuitBreaker, CircuitBreakerError, CircuitBreakerLayer, CircuitConfig, CircuitState,
};
use pipeline_resilience_core::ResilienceError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tower::{service_fn, Layer, Service, ServiceBuilder, ServiceExt};

#[tokio::test(start_paused = true)]
async fn open_circuit_short_circuits_the_inner_service() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let breaker = CircuitBreaker::builder()
        .circuit(
            "llm-api",
            CircuitConfig::builder().timeout(Duration::from_secs(2)).build(),
        )
        .build();

    let mut service = ServiceBuilder::new()
        .layer(CircuitBreakerLayer::new(breaker.clone(), "llm-api"))
        .service(service_fn(move |prompt: String| {
            c.fetch_add(1, Ordering::SeqCst);
            async move { Err::<String, _>(std::io::Error::other(format!("503 for {prompt}"))) }
        }));

    for _ in 0..5 {
        let _ = service.ready().await.unwrap().call("hi".to_string()).await;
    }
    assert!(breaker.is_open("llm-api"));

    let err = service
        .ready()
        .await
        .unwrap()
        .call("hi".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, CircuitBreakerError::OpenCircuit { ref name } if name == "llm-api"));
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    let err: ResilienceError<std::io::Error> = err.into();
    assert!(err.is_circuit_open());
}

#[tokio::test(start_paused = true)]
async fn layer_recovers_through_a_trial_call() {
    let healthy = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&healthy);
    let breaker = CircuitBreaker::builder()
        .circuit(
            "fetch",
            CircuitConfig::builder()
                .success_threshold(1)
                .timeout(Duration::from_secs(1))
                .build(),
        )
        .build();

    let mut service = CircuitBreakerLayer::new(breaker.clone(), "fetch").layer(service_fn(
        move |n: u32| {
            let ok = h.load(Ordering::SeqCst) > 0;
            async move {
                if ok {
                    Ok(n)
                } else {
                    Err(std::io::Error::other("connection refused"))
                }
            }
        },
    ));

    for _ in 0..5 {
        let _ = service.ready().await.unwrap().call(1).await;
    }
    assert!(breaker.is_open("fetch"));

    healthy.store(1, Ordering::SeqCst);
    sleep(Duration::from_millis(1001)).await;

    let out = service.ready().await.unwrap().call(7).await.unwrap();
    assert_eq!(out, 7);
    assert_eq!(breaker.state("fetch"), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn services_on_the_same_key_share_one_circuit() {
    let breaker = CircuitBreaker::default();
    let layer = CircuitBreakerLayer::new(breaker.clone(), "disk");

    let mut reader = layer.layer(service_fn(|_: ()| async {
        Err::<(), _>(std::io::Error::other("EIO"))
    }));
    let mut writer = layer.layer(service_fn(|_: ()| async { Ok::<_, std::io::Error>(()) }));

    for _ in 0..5 {
        let _ = reader.ready().await.unwrap().call(()).await;
    }

    let err = writer.ready().await.unwrap().call(()).await.unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(writer.breaker().statistics("disk").metrics.error_count, 5);
}
