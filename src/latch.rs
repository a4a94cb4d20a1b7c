//! One-shot synchronisation for asynchronous callbacks.
//!
//! - `Latch`: count-down gate with a fixed count, released once it reaches zero.
//! - `CallbackLatch<T>`: wraps one success/failure callback registration and
//!   lets a test thread block until it fires.
//! - `EventObserver`: named single-event latch for stream observers.
//!
//! Latches are never re-armed. A signal past the armed count is a bug in the
//! asynchronous caller and is reported loudly: the `signal_*` methods return
//! `LatchError`, and the callback trait impls panic.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{LatchError, RtcError};
use crate::stream::StreamObserver;

/// Count-down latch.
#[derive(Debug)]
pub struct Latch {
    count: NonZeroU32,
    remaining: Mutex<u32>,
    released: Condvar,
}

impl Latch {
    pub fn new(count: NonZeroU32) -> Self {
        Self {
            count,
            remaining: Mutex::new(count.get()),
            released: Condvar::new(),
        }
    }

    /// Latch released by a single event.
    pub fn single() -> Self {
        Self::new(NonZeroU32::MIN)
    }

    /// Count the latch was armed with.
    pub fn count(&self) -> u32 {
        self.count.get()
    }

    pub fn remaining(&self) -> u32 {
        *self.remaining.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one event. Releases all waiters when the count reaches zero.
    pub fn count_down(&self) -> Result<(), LatchError> {
        let mut remaining = self.remaining.lock().unwrap_or_else(PoisonError::into_inner);
        if *remaining == 0 {
            log::error!("Latch: unexpected event after release");
            return Err(LatchError::Exhausted);
        }
        *remaining -= 1;
        if *remaining == 0 {
            self.released.notify_all();
        }
        Ok(())
    }

    /// Block until released or `timeout` elapses. Returns false on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let remaining = self.remaining.lock().unwrap_or_else(PoisonError::into_inner);
        let (remaining, _) = self
            .released
            .wait_timeout_while(remaining, timeout, |remaining| *remaining > 0)
            .unwrap_or_else(PoisonError::into_inner);
        if *remaining > 0 {
            log::warn!("Latch: timed out after {:?}", timeout);
            return false;
        }
        true
    }
}

/// Completion state of a `CallbackLatch`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Succeeded,
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Pending => "pending",
            Outcome::Succeeded => "succeeded",
            Outcome::Failed => "failed",
        })
    }
}

/// Receives the result of an asynchronous SDK action.
pub trait ActionCallback<T>: Send + Sync {
    fn on_success(&self, result: T);
    fn on_failure(&self, error: RtcError);
}

struct Record<T> {
    outcome: Outcome,
    value: Option<T>,
    error: Option<RtcError>,
    completed_at: Option<Instant>,
}

/// Single-fire gate over a success/failure callback.
///
/// Create one per asynchronous call, hand it to the SDK (usually behind an
/// `Arc`), then block on `await_result` from the test thread.
pub struct CallbackLatch<T> {
    latch: Latch,
    record: Mutex<Record<T>>,
    created_at: Instant,
}

impl<T> Default for CallbackLatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CallbackLatch<T> {
    pub fn new() -> Self {
        Self {
            latch: Latch::single(),
            record: Mutex::new(Record {
                outcome: Outcome::Pending,
                value: None,
                error: None,
                completed_at: None,
            }),
            created_at: Instant::now(),
        }
    }

    /// Number of completions this latch accepts. Always 1.
    pub fn expected_fire_count(&self) -> u32 {
        self.latch.count()
    }

    pub fn signal_success(&self, value: T) -> Result<(), LatchError> {
        self.complete(Outcome::Succeeded, Some(value), None)
    }

    pub fn signal_failure(&self, error: RtcError) -> Result<(), LatchError> {
        self.complete(Outcome::Failed, None, Some(error))
    }

    fn complete(
        &self,
        outcome: Outcome,
        value: Option<T>,
        error: Option<RtcError>,
    ) -> Result<(), LatchError> {
        {
            let mut record = self.lock();
            if record.outcome != Outcome::Pending {
                log::error!(
                    "CallbackLatch: {} signal after the callback already {}",
                    outcome,
                    record.outcome
                );
                return Err(LatchError::AlreadyCompleted {
                    outcome: record.outcome,
                });
            }
            match &error {
                Some(e) => log::debug!("CallbackLatch: failure: {}", e.message),
                None => log::debug!("CallbackLatch: success"),
            }
            record.outcome = outcome;
            record.value = value;
            record.error = error;
            record.completed_at = Some(Instant::now());
        }
        self.latch.count_down()
    }

    /// Block until the callback fires or `timeout` elapses. True only if it
    /// fired in time with the expected outcome.
    pub fn await_result(&self, expect_success: bool, timeout: Duration) -> bool {
        if !self.latch.wait(timeout) {
            log::warn!("CallbackLatch: no callback within {:?}", timeout);
            return false;
        }
        let expected = if expect_success {
            Outcome::Succeeded
        } else {
            Outcome::Failed
        };
        let outcome = self.outcome();
        if outcome != expected {
            log::warn!("CallbackLatch: expected {}, callback {}", expected, outcome);
            return false;
        }
        true
    }

    pub fn outcome(&self) -> Outcome {
        self.lock().outcome
    }

    pub fn error(&self) -> Option<RtcError> {
        self.lock().error.clone()
    }

    /// Moves the success value out. Later calls return `None`.
    pub fn take_value(&self) -> Option<T> {
        self.lock().value.take()
    }

    /// Monotonic completion time, set by the first signal.
    pub fn completed_at(&self) -> Option<Instant> {
        self.lock().completed_at
    }

    /// Time from construction to completion.
    pub fn completion_latency(&self) -> Option<Duration> {
        self.completed_at()
            .map(|at| at.saturating_duration_since(self.created_at))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Record<T>> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> CallbackLatch<T> {
    pub fn value(&self) -> Option<T> {
        self.lock().value.clone()
    }
}

impl<T: Send> ActionCallback<T> for CallbackLatch<T> {
    fn on_success(&self, result: T) {
        if let Err(e) = self.signal_success(result) {
            panic!("{}", e);
        }
    }

    fn on_failure(&self, error: RtcError) {
        if let Err(e) = self.signal_failure(error) {
            panic!("{}", e);
        }
    }
}

/// Observer that waits for a single event, e.g. a stream ending.
#[derive(Debug)]
pub struct EventObserver {
    pub name: String,
    pub id: String,
    latch: Latch,
}

impl Default for EventObserver {
    fn default() -> Self {
        Self::new("N/A", "N/A")
    }
}

impl EventObserver {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            latch: Latch::single(),
        }
    }

    /// True if the event arrived within `timeout`.
    pub fn await_event(&self, timeout: Duration) -> bool {
        self.latch.wait(timeout)
    }

    fn on_event(&self, event: &str) {
        log::debug!("EventObserver: {} {}@{}", event, self.id, self.name);
        if let Err(e) = self.latch.count_down() {
            panic!("{} on {}@{}: {}", event, self.id, self.name, e);
        }
    }
}

impl StreamObserver for EventObserver {
    fn on_ended(&self) {
        self.on_event("on_ended");
    }

    fn on_updated(&self) {
        log::debug!("EventObserver: on_updated {}@{}", self.id, self.name);
    }
}
