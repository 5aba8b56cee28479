//! Retry and fallback requests sent from the manager to the caller.
//!
//! The manager never runs the failing operation itself. For a RETRY or
//! FALLBACK step it sends a [`RecoveryRequest`] over an mpsc channel and waits
//! on the paired [`Responder`] under a deadline. Callers either consume the
//! channel themselves or attach a [`RecoveryHandler`], which
//! [`spawn_handler`] drives on a background task.

use crate::context::ErrorContext;
use crate::policy::RecoveryStrategy;
use futures::future::BoxFuture;
use pipeline_resilience_core::BoxError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Answer to a request: a value, "no value", or the operation's error.
pub type RecoveryReply<T> = Result<Option<T>, BoxError>;

/// One-shot reply slot of a [`RecoveryRequest`].
#[derive(Debug)]
pub struct Responder<T> {
    tx: oneshot::Sender<RecoveryReply<T>>,
}

impl<T> Responder<T> {
    pub(crate) fn pair() -> (Self, oneshot::Receiver<RecoveryReply<T>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Sends the reply. Returns false if the manager stopped waiting.
    pub fn send(self, reply: RecoveryReply<T>) -> bool {
        self.tx.send(reply).is_ok()
    }

    /// Replies with a value.
    pub fn succeed(self, value: T) -> bool {
        self.send(Ok(Some(value)))
    }

    /// Replies with the operation's error.
    pub fn fail(self, error: impl Into<BoxError>) -> bool {
        self.send(Err(error.into()))
    }

    /// True once the manager gave up on this request (deadline passed).
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Command sent to the caller for a RETRY or FALLBACK step.
#[derive(Debug)]
pub enum RecoveryRequest<T> {
    /// Run the failed operation again.
    Retry {
        context: ErrorContext,
        /// 1-based attempt within the current RETRY step.
        attempt: u32,
        deadline: Duration,
        responder: Responder<T>,
    },
    /// Produce a substitute value for the failed operation.
    Fallback {
        context: ErrorContext,
        deadline: Duration,
        responder: Responder<T>,
    },
}

impl<T> RecoveryRequest<T> {
    pub fn strategy(&self) -> RecoveryStrategy {
        match self {
            RecoveryRequest::Retry { .. } => RecoveryStrategy::Retry,
            RecoveryRequest::Fallback { .. } => RecoveryStrategy::Fallback,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            RecoveryRequest::Retry { context, .. } | RecoveryRequest::Fallback { context, .. } => {
                context
            }
        }
    }

    /// How long the manager waits for the reply.
    pub fn deadline(&self) -> Duration {
        match self {
            RecoveryRequest::Retry { deadline, .. } | RecoveryRequest::Fallback { deadline, .. } => {
                *deadline
            }
        }
    }

    /// Answers the request.
    pub fn respond(self, reply: RecoveryReply<T>) -> bool {
        match self {
            RecoveryRequest::Retry { responder, .. }
            | RecoveryRequest::Fallback { responder, .. } => responder.send(reply),
        }
    }
}

/// Caller-side implementation of RETRY and FALLBACK.
///
/// ```rust
/// use futures::future::BoxFuture;
/// use pipeline_resilience_core::BoxError;
/// use pipeline_resilience_recovery::{ErrorContext, RecoveryHandler};
///
/// struct CachedDraft;
///
/// impl RecoveryHandler<String> for CachedDraft {
///     fn retry(&self, _ctx: ErrorContext, _attempt: u32) -> BoxFuture<'static, Result<Option<String>, BoxError>> {
///         Box::pin(async { Err("model still unavailable".into()) })
///     }
///
///     fn fallback(&self, _ctx: ErrorContext) -> BoxFuture<'static, Result<Option<String>, BoxError>> {
///         Box::pin(async { Ok(Some("cached draft".to_string())) })
///     }
/// }
/// ```
pub trait RecoveryHandler<T>: Send + Sync + 'static {
    /// Runs the failed operation again.
    fn retry(&self, context: ErrorContext, attempt: u32) -> BoxFuture<'static, RecoveryReply<T>>;

    /// Produces a substitute value.
    fn fallback(&self, context: ErrorContext) -> BoxFuture<'static, RecoveryReply<T>>;
}

/// Serves requests from `requests` with `handler` until every sender is dropped.
///
/// Each request runs on its own task so a slow retry never delays a fallback.
pub fn spawn_handler<T, H>(handler: H, mut requests: mpsc::Receiver<RecoveryRequest<T>>) -> JoinHandle<()>
where
    T: Send + 'static,
    H: RecoveryHandler<T>,
{
    let handler = Arc::new(handler);
    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                match request {
                    RecoveryRequest::Retry {
                        context,
                        attempt,
                        responder,
                        ..
                    } => {
                        let reply = handler.retry(context, attempt).await;
                        if !responder.send(reply) {
                            tracing::debug!(attempt, "Retry reply arrived after its deadline");
                        }
                    }
                    RecoveryRequest::Fallback { context, responder, .. } => {
                        let reply = handler.fallback(context).await;
                        if !responder.send(reply) {
                            tracing::debug!("Fallback reply arrived after its deadline");
                        }
                    }
                }
            });
        }
    })
}
