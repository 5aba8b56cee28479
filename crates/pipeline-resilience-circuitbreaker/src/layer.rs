use crate::error::CircuitBreakerError;
use crate::CircuitBreaker;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Decides whether a call outcome counts as an error for the circuit.
pub trait FailureClassifier<Res, Err>: Send + Sync {
    /// Returns true if `result` should be recorded as an error.
    fn classify(&self, result: &Result<Res, Err>) -> bool;
}

/// Every `Err` is an error, every `Ok` a success.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl<Res, Err> FailureClassifier<Res, Err> for DefaultClassifier {
    fn classify(&self, result: &Result<Res, Err>) -> bool {
        result.is_err()
    }
}

/// Closure-backed classifier.
pub struct FnClassifier<F>(Arc<F>);

impl<F> Clone for FnClassifier<F> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<F, Res, Err> FailureClassifier<Res, Err> for FnClassifier<F>
where
    F: Fn(&Result<Res, Err>) -> bool + Send + Sync,
{
    fn classify(&self, result: &Result<Res, Err>) -> bool {
        (self.0)(result)
    }
}

/// A tower layer that gates calls through one circuit of a shared [`CircuitBreaker`].
///
/// Each call asks [`CircuitBreaker::acquire`] for a permit and fails fast with
/// [`CircuitBreakerError::OpenCircuit`] when refused. Otherwise the outcome of
/// the inner service is reported back to the circuit. A call dropped before the
/// inner service answers reports nothing and frees its half-open trial slot.
///
/// ```rust
/// use pipeline_resilience_circuitbreaker::{CircuitBreaker, CircuitBreakerLayer};
/// use tower::{ServiceBuilder, service_fn};
///
/// let breaker = CircuitBreaker::default();
/// let service = ServiceBuilder::new()
///     .layer(CircuitBreakerLayer::new(breaker, "llm-api"))
///     .service(service_fn(|req: String| async move { Ok::<_, std::io::Error>(req) }));
/// ```
#[derive(Clone)]
pub struct CircuitBreakerLayer<C = DefaultClassifier> {
    breaker: CircuitBreaker,
    name: Arc<str>,
    classifier: C,
}

impl CircuitBreakerLayer<DefaultClassifier> {
    /// Gates calls through the circuit `name` of `breaker`.
    pub fn new(breaker: CircuitBreaker, name: impl Into<String>) -> Self {
        Self {
            breaker,
            name: Arc::from(name.into()),
            classifier: DefaultClassifier,
        }
    }

    /// Replaces the default "every `Err` is an error" classification.
    pub fn failure_classifier<F>(self, f: F) -> CircuitBreakerLayer<FnClassifier<F>> {
        CircuitBreakerLayer {
            breaker: self.breaker,
            name: self.name,
            classifier: FnClassifier(Arc::new(f)),
        }
    }
}

impl<S, C: Clone> Layer<S> for CircuitBreakerLayer<C> {
    type Service = CircuitBreakerService<S, C>;

    fn layer(&self, service: S) -> Self::Service {
        CircuitBreakerService {
            inner: service,
            breaker: self.breaker.clone(),
            name: Arc::clone(&self.name),
            classifier: self.classifier.clone(),
        }
    }
}

/// Service produced by [`CircuitBreakerLayer`].
#[derive(Clone)]
pub struct CircuitBreakerService<S, C = DefaultClassifier> {
    inner: S,
    breaker: CircuitBreaker,
    name: Arc<str>,
    classifier: C,
}

impl<S, C> CircuitBreakerService<S, C> {
    /// The breaker this service reports to.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// The circuit key this service is gated by.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<S, C, Req> Service<Req> for CircuitBreakerService<S, C>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
    C: FailureClassifier<S::Response, S::Error> + Clone + 'static,
{
    type Response = S::Response;
    type Error = CircuitBreakerError<S::Error>;
    type Future = BoxFuture<'static, Result<S::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(CircuitBreakerError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let breaker = self.breaker.clone();
        let name = Arc::clone(&self.name);
        let classifier = self.classifier.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(permit) = breaker.acquire(&name) else {
                return Err(CircuitBreakerError::OpenCircuit {
                    name: name.to_string(),
                });
            };

            let result = inner.call(req).await;
            if classifier.classify(&result) {
                permit.record_error();
            } else {
                permit.record_success();
            }
            result.map_err(CircuitBreakerError::Inner)
        })
    }
}
