//! Shared buffer and handshake between a bridge and its worker.
//!
//! Layout mirrors what both sides agree on:
//!
//! - bytes `[0, 4)`: the header word, a signed 32-bit tri-state. `0` means
//!   no result yet, `+N` a successful payload of `N` bytes, `-N` a failure
//!   payload of `N` bytes.
//! - bytes `[4, capacity)`: the payload area. Grows on demand, never
//!   shrinks, and never past the configured maximum.
//!
//! The header word is the only synchronization point. The worker owns the
//! payload area while the word is zero; the caller reads it only after
//! observing a non-zero word. Publish order is mandatory: payload bytes
//! first, then a release-store of the word, then the wake.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Size of the header word preceding the payload area.
pub(crate) const HEADER_BYTES: usize = 4;

/// Outcome status carried by the header word's sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    Success,
    Failure,
}

/// Reported when an outcome cannot fit even after growing to the maximum.
/// Counts are whole-buffer bytes, header word included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Overflow {
    pub allowed: usize,
    pub required: usize,
}

pub(crate) struct ShareChannel {
    header: AtomicI32,
    payload: UnsafeCell<Vec<u8>>,
    /// Largest payload the buffer may grow to hold.
    max_payload: usize,
    /// Whole-buffer growth ceiling, kept for overflow reporting.
    max_buffer: usize,
    wake_lock: Mutex<()>,
    wake: Condvar,
}

// The payload area is written by the worker only while the header word is
// zero and the caller is parked in `wait`, and read by the caller only after
// an acquire-load of a non-zero word. Access never overlaps.
unsafe impl Send for ShareChannel {}
unsafe impl Sync for ShareChannel {}

impl ShareChannel {
    pub fn new(buffer_size: usize, max_buffer_size: usize) -> Self {
        assert!(buffer_size > HEADER_BYTES, "buffer too small for its header");
        assert!(buffer_size <= max_buffer_size);
        Self {
            header: AtomicI32::new(0),
            payload: UnsafeCell::new(vec![0u8; buffer_size - HEADER_BYTES]),
            max_payload: (max_buffer_size - HEADER_BYTES).min(i32::MAX as usize),
            max_buffer: max_buffer_size,
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    /// Clear the header word ahead of the next request. Only the bridge calls
    /// this, and only while the worker is idle between requests.
    pub fn reset(&self) {
        self.header.store(0, Ordering::Release);
    }

    /// Current whole-buffer capacity. Meaningful only while no publish is in
    /// flight.
    pub fn capacity_bytes(&self) -> usize {
        HEADER_BYTES + unsafe { &*self.payload.get() }.len()
    }

    /// Worker-side write protocol: copy the payload, publish the header word,
    /// wake the waiter. Grows the payload area exactly to fit if needed.
    pub fn publish(&self, status: Status, bytes: &[u8]) -> Result<(), Overflow> {
        if bytes.len() > self.max_payload {
            return Err(Overflow {
                allowed: self.max_buffer,
                required: HEADER_BYTES + bytes.len(),
            });
        }
        // A zero-length payload would publish a zero header word, which the
        // waiter cannot distinguish from "pending". The codec never produces
        // empty output.
        debug_assert!(!bytes.is_empty());

        // Exclusive access: header word is zero, caller is parked.
        let payload = unsafe { &mut *self.payload.get() };
        if payload.len() < bytes.len() {
            payload.resize(bytes.len(), 0);
            tracing::debug!(
                capacity = HEADER_BYTES + payload.len(),
                "grew shared buffer"
            );
        }
        payload[..bytes.len()].copy_from_slice(bytes);

        let word = match status {
            Status::Success => bytes.len() as i32,
            Status::Failure => -(bytes.len() as i32),
        };

        // Store-then-wake, with the store under the wake lock: a waiter that
        // saw a zero header holds the lock until it parks, so it either sees
        // this word or receives this notification.
        let guard = self.wake_lock.lock().unwrap();
        self.header.store(word, Ordering::Release);
        drop(guard);
        self.wake.notify_all();
        Ok(())
    }

    /// Bridge-side read protocol: park until the header word goes non-zero,
    /// then read the status and exactly the published number of payload
    /// bytes. Returns `None` when `timeout` elapses first.
    pub fn wait(&self, timeout: Option<Duration>) -> Option<(Status, Vec<u8>)> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.wake_lock.lock().unwrap();
        loop {
            let word = self.header.load(Ordering::Acquire);
            if word != 0 {
                drop(guard);
                return Some(self.take(word));
            }
            match deadline {
                None => guard = self.wake.wait(guard).unwrap(),
                Some(deadline) => {
                    let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                        return None;
                    };
                    guard = self.wake.wait_timeout(guard, remaining).unwrap().0;
                }
            }
        }
    }

    fn take(&self, word: i32) -> (Status, Vec<u8>) {
        let status = if word < 0 {
            Status::Failure
        } else {
            Status::Success
        };
        let len = word.unsigned_abs() as usize;
        // The acquire-load of the header word ordered the worker's payload
        // writes before this read.
        let payload = unsafe { &*self.payload.get() };
        (status, payload[..len].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn publish_then_wait_returns_status_and_payload() {
        let channel = ShareChannel::new(64, 64);
        channel.publish(Status::Success, b"hello").unwrap();
        let (status, payload) = channel.wait(None).unwrap();
        assert_eq!(status, Status::Success);
        assert_eq!(payload, b"hello");

        channel.reset();
        channel.publish(Status::Failure, b"nope").unwrap();
        let (status, payload) = channel.wait(None).unwrap();
        assert_eq!(status, Status::Failure);
        assert_eq!(payload, b"nope");
    }

    #[test]
    fn wait_times_out_while_pending() {
        let channel = ShareChannel::new(64, 64);
        let started = Instant::now();
        assert!(channel.wait(Some(Duration::from_millis(50))).is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn wake_crosses_threads() {
        let channel = Arc::new(ShareChannel::new(64, 64));
        let publisher = channel.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            publisher.publish(Status::Success, b"late").unwrap();
        });

        let (status, payload) = channel.wait(Some(Duration::from_secs(10))).unwrap();
        assert_eq!(status, Status::Success);
        assert_eq!(payload, b"late");
        handle.join().unwrap();
    }

    #[test]
    fn growth_is_exact_and_monotonic() {
        let channel = ShareChannel::new(8, 64);
        assert_eq!(channel.capacity_bytes(), 8);

        let big = vec![7u8; 32];
        channel.publish(Status::Success, &big).unwrap();
        assert_eq!(channel.capacity_bytes(), HEADER_BYTES + 32);
        let (_, payload) = channel.wait(None).unwrap();
        assert_eq!(payload, big);

        // A smaller follow-up payload must not shrink the buffer.
        channel.reset();
        channel.publish(Status::Success, b"tiny").unwrap();
        assert_eq!(channel.capacity_bytes(), HEADER_BYTES + 32);
        let (_, payload) = channel.wait(None).unwrap();
        assert_eq!(payload, b"tiny");
    }

    #[test]
    fn overflow_reports_whole_buffer_counts() {
        let channel = ShareChannel::new(8, 64);
        let oversized = vec![0u8; 100];
        let err = channel.publish(Status::Success, &oversized).unwrap_err();
        assert_eq!(
            err,
            Overflow {
                allowed: 64,
                required: HEADER_BYTES + 100,
            }
        );
        // The failed publish left nothing behind.
        assert!(channel.wait(Some(Duration::from_millis(10))).is_none());
    }
}
