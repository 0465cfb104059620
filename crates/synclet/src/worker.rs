//! Worker-side runtime: receives requests, runs the async handler, publishes
//! the outcome through the share channel.

use std::any::Any;
use std::cell::RefCell;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::channel::{ShareChannel, Status};
use crate::codec::{self, FailureEnvelope};
use crate::error::{HandlerError, WorkerError};

pub(crate) struct WorkerContext {
    pub requests: Receiver<Vec<u8>>,
    pub channel: Arc<ShareChannel>,
}

thread_local! {
    static CONTEXT: RefCell<Option<WorkerContext>> = const { RefCell::new(None) };
}

/// Installed by the bridge on a freshly spawned worker thread, before the
/// user's entry point runs.
pub(crate) fn install_context(context: WorkerContext) {
    CONTEXT.with(|slot| *slot.borrow_mut() = Some(context));
}

/// Register `handler` as this worker's request handler and serve until the
/// bridge goes away.
///
/// Must be called exactly once, from inside the entry point passed to
/// [`create_sync_fn`](crate::create_sync_fn); any other invocation fails with
/// [`WorkerError::NotAWorker`]. Requests are served strictly one at a time on
/// a current-thread tokio runtime: each handler future is awaited to
/// completion, its outcome is published, and only then is the next request
/// picked up. The handler may suspend internally as much as it likes; the
/// caller only ever observes the final publication.
///
/// Returns `Ok(())` once the owning bridge has been dropped or replaced.
pub fn run_as_worker<A, R, F, Fut>(handler: F) -> Result<(), WorkerError>
where
    A: DeserializeOwned,
    R: Serialize,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<R, HandlerError>>,
{
    let context = CONTEXT
        .with(|slot| slot.borrow_mut().take())
        .ok_or(WorkerError::NotAWorker)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(WorkerError::Runtime)?;

    while let Ok(encoded) = context.requests.recv() {
        let outcome = match codec::decode::<A>(&encoded) {
            Ok(args) => {
                match panic::catch_unwind(AssertUnwindSafe(|| runtime.block_on(handler(args)))) {
                    Ok(Ok(value)) => match codec::encode(&value) {
                        Ok(bytes) => Ok(bytes),
                        Err(err) => Err(FailureEnvelope::from_handler(
                            &HandlerError::new(format!("failed to encode worker response: {err}"))
                                .with_name("EncodeError"),
                        )),
                    },
                    Ok(Err(err)) => Err(FailureEnvelope::from_handler(&err)),
                    // A panicking handler is reported like any other handler
                    // failure; the worker stays up.
                    Err(payload) => Err(FailureEnvelope::from_handler(
                        &HandlerError::new(panic_message(payload.as_ref())).with_name("Panic"),
                    )),
                }
            }
            Err(err) => Err(FailureEnvelope::from_handler(
                &HandlerError::new(format!("failed to decode request arguments: {err}"))
                    .with_name("DecodeError"),
            )),
        };
        publish_outcome(&context.channel, outcome);
    }

    Ok(())
}

/// Publish a success payload or a failure envelope, substituting the
/// synthesized overflow envelope when the outcome does not fit.
fn publish_outcome(channel: &ShareChannel, outcome: Result<Vec<u8>, FailureEnvelope>) {
    let (status, bytes) = match outcome {
        Ok(bytes) => (Status::Success, bytes),
        Err(envelope) => match codec::encode(&envelope) {
            Ok(bytes) => (Status::Failure, bytes),
            Err(err) => {
                tracing::error!(%err, "failed to encode failure envelope");
                return;
            }
        },
    };

    let overflow = match channel.publish(status, &bytes) {
        Ok(()) => return,
        Err(overflow) => overflow,
    };
    tracing::warn!(
        allowed = overflow.allowed,
        required = overflow.required,
        "worker response exceeds the transfer limit"
    );

    let substitute = FailureEnvelope::overflow(overflow.allowed, overflow.required);
    match codec::encode(&substitute) {
        Ok(bytes) => {
            if channel.publish(Status::Failure, &bytes).is_err() {
                // Not even the notice fits; the caller is left to its
                // timeout.
                tracing::error!(
                    allowed = overflow.allowed,
                    "shared buffer too small to publish the overflow notice"
                );
            }
        }
        Err(err) => tracing::error!(%err, "failed to encode overflow notice"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker handler panicked".to_owned()
    }
}
