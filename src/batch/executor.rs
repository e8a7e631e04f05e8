//! Batch executor and the `run_batches` / `map_batches` entry points
//!
//! Both entry points share the same shape:
//! - inputs shorter than `min_size_for_concurrency` are handed to the batch
//!   function in a single call on the calling task
//! - larger inputs are split into batches and dispatched to at most
//!   `max_threads` concurrent workers
//! - the first error cancels the run and is returned
//! - the first panic cancels the run and is resumed on the calling task

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::batch::governor;
use crate::config::{BatchConfig, BatchOption};
use crate::context::Context;
use crate::BatchError;

/// Runs batch functions with a fixed configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchExecutor {
    config: BatchConfig,
}

impl BatchExecutor {
    /// Executor with the default configuration
    pub fn new() -> Self {
        Self { config: BatchConfig::default() }
    }

    /// Executor with `config`; out-of-range fields fall back to their defaults
    pub fn from_config(config: BatchConfig) -> Self {
        Self { config: config.sanitized() }
    }

    /// Executor with `options` merged over the default configuration
    pub fn from_options<I>(options: I) -> Self
    where
        I: IntoIterator<Item = BatchOption>,
    {
        Self { config: BatchConfig::resolve(options) }
    }

    /// Set the number of items per batch (ignored when zero)
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.config = self.config.with(BatchOption::BatchSize(size));
        self
    }

    /// Set the input length below which everything runs in one call (ignored below 2)
    pub fn with_min_size_for_concurrency(mut self, min: usize) -> Self {
        self.config = self.config.with(BatchOption::MinSizeForConcurrency(min));
        self
    }

    /// Set the maximum number of concurrently running batches (ignored when zero)
    pub fn with_max_threads(mut self, threads: usize) -> Self {
        self.config = self.config.with(BatchOption::MaxThreads(threads));
        self
    }

    /// The resolved configuration
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    fn runs_inline(&self, len: usize) -> bool {
        len < self.config.min_size_for_concurrency
    }

    /// Run `f` once per batch of `items`.
    ///
    /// Returns the first error any batch produced. If the run is cancelled
    /// while batches are still being dispatched, this returns without waiting
    /// for batches that are already running.
    #[instrument(
        skip_all,
        fields(
            items = items.len(),
            batch_size = self.config.batch_size,
            max_threads = self.config.max_threads,
        )
    )]
    pub async fn run<T, E, F, Fut>(&self, ctx: &Context, items: Vec<T>, f: F) -> Result<(), BatchError<E>>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: Fn(Context, Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        if self.runs_inline(items.len()) {
            debug!("input below concurrency threshold, running inline");
            return f(ctx.clone(), items).await.map_err(BatchError::Batch);
        }

        governor::dispatch(ctx, items, &self.config, Arc::new(f)).await?;
        Ok(())
    }

    /// Transform `items` batch by batch, keeping the input order in the output.
    ///
    /// `f` must return exactly one output per input item; a batch that does
    /// not is treated as a panic of the batch function. On error no partial
    /// results are returned.
    #[instrument(
        skip_all,
        fields(
            items = items.len(),
            batch_size = self.config.batch_size,
            max_threads = self.config.max_threads,
        )
    )]
    pub async fn map<T, R, E, F, Fut>(&self, ctx: &Context, items: Vec<T>, f: F) -> Result<Vec<R>, BatchError<E>>
    where
        T: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
        F: Fn(Context, Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<R>, E>> + Send + 'static,
    {
        if self.runs_inline(items.len()) {
            debug!("input below concurrency threshold, running inline");
            return f(ctx.clone(), items).await.map_err(BatchError::Batch);
        }

        let total = items.len();
        let f = Arc::new(f);
        let checked = move |ctx: Context, batch: Vec<T>| {
            let f = f.clone();
            let expected = batch.len();
            async move {
                let output = f(ctx, batch).await?;
                assert_eq!(
                    output.len(),
                    expected,
                    "batch function returned {} results for {} inputs",
                    output.len(),
                    expected
                );
                Ok::<_, E>(output)
            }
        };

        // Every batch owns the output range that matches its input range, and
        // the governor returns the ranges in dispatch order.
        let ranges = governor::dispatch(ctx, items, &self.config, Arc::new(checked)).await?;
        let mut results = Vec::with_capacity(total);
        for range in ranges {
            results.extend(range);
        }
        debug_assert_eq!(results.len(), total);

        Ok(results)
    }
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Divide `items` into batches and run `f` for each of them.
///
/// Returns the first error encountered. A panic in `f` is resumed on the
/// calling task.
pub async fn run_batches<T, E, F, Fut, I>(ctx: &Context, items: Vec<T>, f: F, options: I) -> Result<(), BatchError<E>>
where
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(Context, Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    I: IntoIterator<Item = BatchOption>,
{
    BatchExecutor::from_options(options).run(ctx, items, f).await
}

/// Divide `items` into batches, transform each with `f`, and return the
/// concatenated results in input order.
///
/// Returns the first error encountered and no results if any batch fails. A
/// panic in `f` is resumed on the calling task.
pub async fn map_batches<T, R, E, F, Fut, I>(
    ctx: &Context,
    items: Vec<T>,
    f: F,
    options: I,
) -> Result<Vec<R>, BatchError<E>>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(Context, Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<R>, E>> + Send + 'static,
    I: IntoIterator<Item = BatchOption>,
{
    BatchExecutor::from_options(options).map(ctx, items, f).await
}
