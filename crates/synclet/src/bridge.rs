//! Caller-side bridge: owns the worker generation and the blocking call path.

use std::marker::PhantomData;
use std::panic;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::channel::{ShareChannel, Status};
use crate::codec::{self, FailureEnvelope};
use crate::config::BridgeConfig;
use crate::error::CallError;
use crate::worker::{self, WorkerContext};

/// One worker thread plus its share channel. Replaced wholesale on timeout;
/// the old worker keeps its own handle to the abandoned channel and whatever
/// it eventually publishes there is never read.
struct Generation {
    requests: Sender<Vec<u8>>,
    channel: Arc<ShareChannel>,
    worker: Option<JoinHandle<()>>,
}

/// A blocking front for an async handler running on a dedicated worker
/// thread.
///
/// `A` is the request argument value sent to the handler, `R` the result it
/// produces; both cross the bridge through the serialization envelope.
/// [`call`](SyncFn::call) takes `&mut self`, which makes the one-in-flight-
/// call-per-bridge contract a compile-time fact rather than a convention.
///
/// Dropping the bridge retires the worker: the request channel closes and
/// the worker's serve loop ends after any in-flight handler completes.
pub struct SyncFn<A, R> {
    entry: Arc<dyn Fn() + Send + Sync + 'static>,
    config: BridgeConfig,
    generation: Generation,
    _types: PhantomData<fn(&A) -> R>,
}

/// Build a [`SyncFn`] whose worker thread runs `entry`.
///
/// `entry` is the worker's entry point: it runs once per generation on a
/// fresh thread and must call [`run_as_worker`](crate::run_as_worker) to
/// register the actual handler. It is kept for the lifetime of the bridge so
/// a replacement generation can run it again after a timeout.
///
/// Panics if `config.buffer_size` exceeds `config.max_buffer_size`.
pub fn create_sync_fn<A, R, E>(entry: E, config: BridgeConfig) -> SyncFn<A, R>
where
    A: Serialize,
    R: DeserializeOwned,
    E: Fn() + Send + Sync + 'static,
{
    let entry: Arc<dyn Fn() + Send + Sync> = Arc::new(entry);
    let generation = spawn_generation(&entry, &config);
    SyncFn {
        entry,
        config,
        generation,
        _types: PhantomData,
    }
}

fn spawn_generation(entry: &Arc<dyn Fn() + Send + Sync>, config: &BridgeConfig) -> Generation {
    let (requests, receiver) = mpsc::channel();
    let channel = Arc::new(ShareChannel::new(config.buffer_size, config.max_buffer_size));

    let worker_channel = channel.clone();
    let entry = entry.clone();
    let worker = thread::Builder::new()
        .name("synclet-worker".to_owned())
        .spawn(move || {
            worker::install_context(WorkerContext {
                requests: receiver,
                channel: worker_channel,
            });
            entry();
        })
        .expect("failed to spawn worker thread");

    tracing::debug!(
        buffer_size = config.buffer_size,
        max_buffer_size = config.max_buffer_size,
        "spawned worker generation"
    );
    Generation {
        requests,
        channel,
        worker: Some(worker),
    }
}

impl<A, R> SyncFn<A, R>
where
    A: Serialize,
    R: DeserializeOwned,
{
    /// Send `args` to the worker and block until it publishes the outcome.
    ///
    /// On timeout the current generation is abandoned and replaced before
    /// this returns [`CallError::Timeout`]; the next call runs on the fresh
    /// worker. All other failures leave the generation in place.
    pub fn call(&mut self, args: &A) -> Result<R, CallError> {
        let encoded = codec::encode(args).map_err(CallError::EncodeRequest)?;

        self.generation.channel.reset();
        if self.generation.requests.send(encoded).is_err() {
            self.raise_worker_fatal();
        }

        match self.generation.channel.wait(self.config.timeout) {
            None => {
                tracing::warn!("call timed out, replacing the worker generation");
                self.generation = spawn_generation(&self.entry, &self.config);
                Err(CallError::Timeout)
            }
            Some((Status::Success, bytes)) => {
                codec::decode(&bytes).map_err(CallError::DecodeResponse)
            }
            Some((Status::Failure, bytes)) => {
                let envelope: FailureEnvelope =
                    codec::decode(&bytes).map_err(CallError::DecodeResponse)?;
                Err(match envelope.overflow_bytes() {
                    Some((allowed, required)) => CallError::TransferOverflow { allowed, required },
                    None => CallError::Handler(envelope.into_handler()),
                })
            }
        }
    }

    /// The request channel is closed, so the worker thread is gone without
    /// the bridge having retired it. That class of failure is out of contract
    /// and is deliberately not absorbed: re-raise whatever took the worker
    /// down at the call site.
    fn raise_worker_fatal(&mut self) -> ! {
        match self.generation.worker.take() {
            Some(handle) => match handle.join() {
                Err(payload) => panic::resume_unwind(payload),
                Ok(()) => panic!("worker entry returned without serving requests"),
            },
            None => panic!("worker thread is gone"),
        }
    }
}
