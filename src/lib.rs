//! # Batching
//!
//! Bounded-concurrency batch execution on top of the Tokio runtime.
//!
//! ## Overview
//!
//! A finite sequence of items is split into contiguous batches, and a user
//! supplied async function is run once per batch, either on the calling task
//! (small inputs) or across a capped number of concurrently running workers.
//! The first error cancels the run, the first panic is re-raised on the
//! caller's task, and the mapping variant returns results in input order.
//!
//! ## Quick Start
//!
//! ```rust
//! use batching::{map_batches, BatchOption, Context};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = Context::background();
//! let squares = map_batches(
//!     &ctx,
//!     (1..=9).collect::<Vec<u64>>(),
//!     |_ctx, batch: Vec<u64>| async move {
//!         Ok::<_, std::io::Error>(batch.into_iter().map(|v| v * v).collect::<Vec<u64>>())
//!     },
//!     [BatchOption::BatchSize(2), BatchOption::MaxThreads(4)],
//! )
//! .await?;
//!
//! assert_eq!(squares, vec![1, 4, 9, 16, 25, 36, 49, 64, 81]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: option merging and the resolved run configuration
//! - [`context`]: cancellation contexts with deadlines
//! - [`batch`]: splitter, concurrency governor and the entry points

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for batch runs
pub type Result<T, E> = std::result::Result<T, BatchError<E>>;

/// Error returned by a batch run
///
/// Only the first failure of a run is kept. Panics raised by the batch
/// function are never turned into this type; they are resumed on the
/// caller's task instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError<E> {
    /// The batch function returned an error
    #[error("batch function failed: {0}")]
    Batch(E),

    /// The run was cancelled before every batch could be dispatched
    #[error("batch run cancelled: {0}")]
    Cancelled(CancelCause),
}

impl<E> BatchError<E> {
    /// Returns the batch function's own error, if that is what ended the run
    pub fn into_batch_error(self) -> Option<E> {
        match self {
            BatchError::Batch(err) => Some(err),
            BatchError::Cancelled(_) => None,
        }
    }

    /// Returns the cancellation cause, if the run ended by cancellation
    pub fn cancel_cause(&self) -> Option<CancelCause> {
        match self {
            BatchError::Batch(_) => None,
            BatchError::Cancelled(cause) => Some(*cause),
        }
    }

    /// True when the run ended because its context was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BatchError::Cancelled(_))
    }
}

/// Run configuration and option merging
pub mod config;

/// Cancellation contexts
pub mod context;

/// Batch splitting, dispatch and entry points
pub mod batch;

pub use batch::{map_batches, run_batches, BatchExecutor};
pub use config::{BatchConfig, BatchOption};
pub use context::{CancelCause, Context};
