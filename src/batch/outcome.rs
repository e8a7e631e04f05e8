//! First-error and first-panic bookkeeping shared by the workers of a run

use std::any::Any;
use std::fmt;

use parking_lot::Mutex;

use crate::context::CancelCause;
use crate::BatchError;

/// Payload of a panic caught inside a worker
pub type PanicPayload = Box<dyn Any + Send + 'static>;

/// How a single batch ended
pub enum BatchOutcome<O, E> {
    /// The batch function returned a value
    Success(O),
    /// The batch function returned an error
    Failed(E),
    /// The batch function panicked
    Aborted(PanicPayload),
}

impl<O, E> fmt::Debug for BatchOutcome<O, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchOutcome::Success(_) => f.write_str("Success"),
            BatchOutcome::Failed(_) => f.write_str("Failed"),
            BatchOutcome::Aborted(_) => f.write_str("Aborted"),
        }
    }
}

/// Terminal state of a run.
///
/// Each slot is written at most once; later writes are dropped.
pub struct RunOutcome<E> {
    error: Mutex<Option<BatchError<E>>>,
    panic: Mutex<Option<PanicPayload>>,
}

impl<E> RunOutcome<E> {
    /// Empty outcome
    pub fn new() -> Self {
        Self { error: Mutex::new(None), panic: Mutex::new(None) }
    }

    /// Record `err` unless an error is already recorded. Returns whether it was kept.
    pub fn record_error(&self, err: BatchError<E>) -> bool {
        let mut slot = self.error.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(err);
        true
    }

    /// Record a cancellation cause as the run's error, if none is set yet
    pub fn record_cancelled(&self, cause: CancelCause) -> bool {
        self.record_error(BatchError::Cancelled(cause))
    }

    /// Record `payload` unless a panic is already recorded. Returns whether it was kept.
    pub fn record_panic(&self, payload: PanicPayload) -> bool {
        let mut slot = self.panic.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(payload);
        true
    }

    /// Fold one batch's outcome in, handing back the output on success.
    ///
    /// Returns `None` when the batch failed; the caller is expected to cancel
    /// the run in that case.
    pub fn settle<O>(&self, outcome: BatchOutcome<O, E>) -> Option<O> {
        match outcome {
            BatchOutcome::Success(output) => Some(output),
            BatchOutcome::Failed(err) => {
                self.record_error(BatchError::Batch(err));
                None
            }
            BatchOutcome::Aborted(payload) => {
                self.record_panic(payload);
                None
            }
        }
    }

    /// True once an error is recorded
    pub fn has_error(&self) -> bool {
        self.error.lock().is_some()
    }

    /// True once a panic is recorded
    pub fn has_panic(&self) -> bool {
        self.panic.lock().is_some()
    }

    /// Take the recorded error
    pub fn take_error(&self) -> Option<BatchError<E>> {
        self.error.lock().take()
    }

    /// Take the recorded panic payload
    pub fn take_panic(&self) -> Option<PanicPayload> {
        self.panic.lock().take()
    }

    /// Resume the recorded panic on the current task, if there is one
    pub fn resume_panic(&self) {
        if let Some(payload) = self.take_panic() {
            std::panic::resume_unwind(payload);
        }
    }
}

impl<E> Default for RunOutcome<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for RunOutcome<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOutcome")
            .field("has_error", &self.has_error())
            .field("has_panic", &self.has_panic())
            .finish()
    }
}
