//! Concurrency governor: dispatches batches to workers under a permit cap
//!
//! The calling task is the dispatcher. Batches are handed out in input order,
//! each behind one permit of a semaphore sized to `max_threads`. A failing or
//! panicking worker cancels the run context, which stops further dispatch.
//!
//! When cancellation is observed at a dispatch point the run returns at once
//! and does **not** wait for batches that are already running. Those keep
//! running detached, see a cancelled context, and give their permit back when
//! they finish. Only the path that dispatched every batch drains all workers
//! before reading the outcome.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::batch::outcome::{BatchOutcome, RunOutcome};
use crate::batch::splitter::{Batch, Batches};
use crate::config::BatchConfig;
use crate::context::{CancelCause, Context};
use crate::BatchError;

/// Run `work` over every batch of `items` and return the per-batch outputs in
/// dispatch order.
///
/// Panics raised by `work` are resumed here, on the dispatching task.
pub(crate) async fn dispatch<T, O, E, F, Fut>(
    ctx: &Context,
    items: Vec<T>,
    config: &BatchConfig,
    work: Arc<F>,
) -> Result<Vec<O>, BatchError<E>>
where
    T: Send + 'static,
    O: Send + 'static,
    E: Send + 'static,
    F: Fn(Context, Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
{
    let run_ctx = ctx.with_cancel();
    let _cancel_on_return = run_ctx.clone().drop_guard();

    let semaphore = Arc::new(Semaphore::new(config.max_threads.min(Semaphore::MAX_PERMITS)));
    let outcome = Arc::new(RunOutcome::new());

    let batches = Batches::new(items, config.batch_size);
    let mut workers: Vec<JoinHandle<Option<O>>> = Vec::with_capacity(batches.len());

    for batch in batches {
        let permit = tokio::select! {
            biased;
            _ = run_ctx.done() => {
                debug!(batch = batch.index, dispatched = workers.len(), "run cancelled at dispatch point");
                outcome.resume_panic();
                let cause = run_ctx.err().unwrap_or(CancelCause::Cancelled);
                outcome.record_cancelled(cause);
                return Err(outcome.take_error().unwrap_or(BatchError::Cancelled(cause)));
            }
            permit = semaphore.clone().acquire_owned() => {
                permit.expect("Semaphore should not be closed")
            }
        };

        trace!(batch = batch.index, offset = batch.offset, len = batch.len(), "dispatching batch");
        workers.push(tokio::spawn(run_worker(
            batch,
            run_ctx.clone(),
            work.clone(),
            outcome.clone(),
            permit,
        )));
    }

    debug!(workers = workers.len(), "all batches dispatched, draining");

    let mut outputs = Vec::with_capacity(workers.len());
    for worker in workers {
        match worker.await {
            Ok(Some(output)) => outputs.push(output),
            Ok(None) => {}
            Err(join_err) if join_err.is_panic() => {
                outcome.record_panic(join_err.into_panic());
            }
            Err(_) => {
                outcome.record_cancelled(CancelCause::Cancelled);
            }
        }
    }

    outcome.resume_panic();
    if let Some(err) = outcome.take_error() {
        return Err(err);
    }

    Ok(outputs)
}

/// Process one batch and fold its result into the run outcome.
///
/// `_permit` is held for the worker's whole lifetime and released on return.
async fn run_worker<T, O, E, F, Fut>(
    batch: Batch<T>,
    ctx: Context,
    work: Arc<F>,
    outcome: Arc<RunOutcome<E>>,
    _permit: OwnedSemaphorePermit,
) -> Option<O>
where
    F: Fn(Context, Vec<T>) -> Fut,
    Fut: Future<Output = Result<O, E>>,
{
    let index = batch.index;
    let worker_ctx = ctx.clone();
    let result = AssertUnwindSafe(async move { work(worker_ctx, batch.items).await })
        .catch_unwind()
        .await;

    let batch_outcome = match result {
        Ok(Ok(output)) => BatchOutcome::Success(output),
        Ok(Err(err)) => BatchOutcome::Failed(err),
        Err(payload) => BatchOutcome::Aborted(payload),
    };
    trace!(batch = index, outcome = ?batch_outcome, "batch finished");

    let output = outcome.settle(batch_outcome);
    if output.is_none() {
        debug!(batch = index, "batch did not succeed, cancelling run");
        ctx.cancel();
    }

    if let Some(cause) = ctx.err() {
        outcome.record_cancelled(cause);
    }

    output
}
