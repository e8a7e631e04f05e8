//! Cancellation contexts
//!
//! A [`Context`] is a cheaply clonable handle that ends either when it is
//! cancelled explicitly, when its parent ends, or when its deadline passes.
//! Batch functions receive the run's context and may poll it to stop early;
//! nothing is ever interrupted by force.
//!
//! Propagation is carried by a [`CancellationToken`] tree. The context adds
//! a deadline and remembers why it was cancelled.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub use tokio_util::sync::DropGuard;

/// Why a context ended
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CancelCause {
    /// `cancel` was called on the context or one of its ancestors
    #[error("context canceled")]
    Cancelled,

    /// The context's deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation context shared between a caller and its batch workers
#[derive(Clone, Debug)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    cause: Arc<OnceLock<CancelCause>>,
    parent: Option<Arc<Context>>,
}

impl Context {
    /// A context that never ends unless cancelled
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            cause: Arc::default(),
            parent: None,
        }
    }

    /// Child context that ends when cancelled or when `self` ends
    pub fn with_cancel(&self) -> Self {
        self.child(self.deadline)
    }

    /// Child context that additionally ends after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Child context that additionally ends at `deadline`
    ///
    /// A parent deadline that is earlier than `deadline` still applies.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let effective = match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        self.child(Some(effective))
    }

    fn child(&self, deadline: Option<Instant>) -> Self {
        Self {
            token: self.token.child_token(),
            deadline,
            cause: Arc::default(),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Deadline of this context, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Token cancelled together with this context
    ///
    /// The token does not observe the deadline.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel this context and every context derived from it.
    ///
    /// Only the first call has an effect.
    pub fn cancel(&self) {
        let cause = self.err().unwrap_or(CancelCause::Cancelled);
        // The cause must be visible before any waiter wakes up.
        let _ = self.cause.set(cause);
        self.token.cancel();
    }

    /// Why this context ended, or `None` while it is still live
    pub fn err(&self) -> Option<CancelCause> {
        if self.token.is_cancelled() {
            return Some(self.recorded_cause().unwrap_or(CancelCause::Cancelled));
        }

        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelCause::DeadlineExceeded),
            _ => None,
        }
    }

    fn recorded_cause(&self) -> Option<CancelCause> {
        std::iter::successors(Some(self), |ctx| ctx.parent.as_deref())
            .find_map(|ctx| ctx.cause.get().copied())
    }

    /// True once the context has ended
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Completes when the context ends
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Guard that cancels this context's token when dropped
    pub fn drop_guard(self) -> DropGuard {
        self.token.drop_guard()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
