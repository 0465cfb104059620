//! Call an async handler from synchronous code.
//!
//! A `synclet` bridge owns a dedicated worker thread running a user-supplied
//! async handler on its own single-threaded runtime. The calling thread posts
//! a request and then blocks on a shared header word until the worker has
//! written the encoded outcome next to it, so the call site needs no async
//! support at all (e.g. one-time initialization code).
//!
//! - [`create_sync_fn`]: build a [`SyncFn`] from a worker entry point
//! - [`SyncFn::call`]: blocking call, returns the handler's result
//! - [`run_as_worker`]: register the async handler inside the entry point
//! - [`BridgeConfig`]: buffer sizing and optional call timeout
//!
//! Handler failures cross the bridge with their message, name and any extra
//! fields intact (see [`HandlerError`]). A timed-out call abandons the worker
//! and transparently starts a fresh one for the next call.
//!
//! ```
//! use synclet::{create_sync_fn, run_as_worker, BridgeConfig, HandlerError, SyncFn};
//!
//! let mut double: SyncFn<u32, u32> = create_sync_fn(
//!     || {
//!         run_as_worker(|n: u32| async move { Ok::<_, HandlerError>(n * 2) }).unwrap();
//!     },
//!     BridgeConfig::default(),
//! );
//!
//! assert_eq!(double.call(&21).unwrap(), 42);
//! ```

mod bridge;
mod channel;
mod codec;
mod config;
mod error;
mod worker;

pub use bridge::{create_sync_fn, SyncFn};
pub use config::{
    BridgeConfig, BUFFER_SIZE_ENV, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_BUFFER_SIZE,
    MAX_BUFFER_SIZE_ENV, TIMEOUT_MS_ENV,
};
pub use error::{CallError, HandlerError, WorkerError};
pub use worker::run_as_worker;
