use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use batching::context::CancelCause;
use batching::{map_batches, run_batches, BatchError, BatchOption, Context};
use pretty_assertions::assert_eq;
use tokio::sync::{oneshot, Notify};

#[tokio::test(start_paused = true)]
async fn test_deadline_stops_dispatch() {
    let ctx = Context::background().with_timeout(Duration::from_millis(50));
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let result = run_batches(
        &ctx,
        (1..=9).collect::<Vec<u32>>(),
        move |_ctx, _batch| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok::<_, String>(())
            }
        },
        [BatchOption::BatchSize(1), BatchOption::MaxThreads(1)],
    )
    .await;

    assert_eq!(result, Err(BatchError::Cancelled(CancelCause::DeadlineExceeded)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_already_cancelled_context_runs_no_batch() {
    let ctx = Context::background();
    ctx.cancel();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let result = map_batches(
        &ctx,
        vec![1, 2, 3, 4],
        move |_ctx, batch: Vec<i32>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, String>(batch) }
        },
        [BatchOption::MaxThreads(2)],
    )
    .await;

    assert_eq!(result, Err(BatchError::Cancelled(CancelCause::Cancelled)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_inline_path_ignores_cancellation() {
    let ctx = Context::background();
    ctx.cancel();

    let result = map_batches(
        &ctx,
        vec![1, 2, 3],
        |ctx: Context, batch: Vec<i32>| async move {
            assert!(ctx.is_done());
            Ok::<_, String>(batch)
        },
        [BatchOption::MinSizeForConcurrency(10)],
    )
    .await;

    assert_eq!(result, Ok(vec![1, 2, 3]));
}

#[tokio::test]
async fn test_batch_function_sees_run_cancellation() {
    let result = run_batches(
        &Context::background(),
        vec![0, 1],
        |ctx: Context, batch: Vec<i32>| async move {
            if batch[0] == 0 {
                return Err("stop");
            }
            ctx.done().await;
            Ok(())
        },
        [BatchOption::MaxThreads(2)],
    )
    .await;

    assert_eq!(result, Err(BatchError::Batch("stop")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_returns_before_running_batches_finish() {
    let gate = Arc::new(Notify::new());
    let finished = Arc::new(AtomicBool::new(false));
    let (done_tx, done_rx) = oneshot::channel::<bool>();
    let done_tx = Arc::new(parking_lot::Mutex::new(Some(done_tx)));

    let (worker_gate, worker_finished, worker_done) = (gate.clone(), finished.clone(), done_tx.clone());
    let result = run_batches(
        &Context::background(),
        vec![0, 1, 2, 3],
        move |ctx: Context, batch: Vec<i32>| {
            let (gate, finished, done) = (worker_gate.clone(), worker_finished.clone(), worker_done.clone());
            async move {
                match batch[0] {
                    0 => {
                        gate.notified().await;
                        finished.store(true, Ordering::SeqCst);
                        if let Some(tx) = done.lock().take() {
                            let _ = tx.send(ctx.is_done());
                        }
                        Ok(())
                    }
                    1 => Err("second batch fails"),
                    _ => Ok(()),
                }
            }
        },
        [BatchOption::MaxThreads(2)],
    )
    .await;

    assert_eq!(result, Err(BatchError::Batch("second batch fails")));
    assert!(!finished.load(Ordering::SeqCst), "straggler should still be running");

    gate.notify_one();
    let saw_cancelled = tokio::time::timeout(Duration::from_secs(5), done_rx)
        .await
        .expect("straggler never finished")
        .expect("straggler dropped its sender");

    assert!(saw_cancelled);
    assert!(finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_parent_cancel_during_run_surfaces_as_cancelled() {
    let ctx = Context::background();
    let calls = Arc::new(AtomicUsize::new(0));

    let (parent, counter) = (ctx.clone(), calls.clone());
    let result = run_batches(
        &ctx,
        (0..10).collect::<Vec<u8>>(),
        move |_ctx, _batch| {
            let (parent, counter) = (parent.clone(), counter.clone());
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 2 {
                    parent.cancel();
                }
                Ok::<_, String>(())
            }
        },
        [BatchOption::BatchSize(1), BatchOption::MaxThreads(1)],
    )
    .await;

    assert_eq!(result, Err(BatchError::Cancelled(CancelCause::Cancelled)));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
