//! Square numbers in batches and compare the run time with the sequential cost
//!
//! Run with `RUST_LOG=batching=debug cargo run --example square_numbers`.

use std::time::{Duration, Instant};

use batching::{map_batches, run_batches, BatchOption, Context};
use tracing_subscriber::EnvFilter;

const WORK: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let ctx = Context::background();
    let tasks: Vec<u64> = (1..=9).collect();
    let options = [
        BatchOption::BatchSize(2),
        BatchOption::MaxThreads(4),
        BatchOption::MinSizeForConcurrency(0),
    ];

    println!("Batch-Run over {:?}", tasks);
    let start = Instant::now();
    run_batches(
        &ctx,
        tasks.clone(),
        |_ctx, batch: Vec<u64>| async move {
            println!("  processing {:?}", batch);
            tokio::time::sleep(WORK).await;
            Ok::<_, anyhow::Error>(())
        },
        options,
    )
    .await
    .map_err(|err| anyhow::anyhow!("run failed: {err}"))?;
    println!("  finished in {:?} (sequential would take {:?})\n", start.elapsed(), WORK * 5);

    println!("Batch-Map over {:?}", tasks);
    let start = Instant::now();
    let squares = map_batches(
        &ctx,
        tasks,
        |_ctx, batch: Vec<u64>| async move {
            println!("  processing {:?}", batch);
            tokio::time::sleep(WORK).await;
            Ok::<_, anyhow::Error>(batch.into_iter().map(|v| v * v).collect::<Vec<u64>>())
        },
        options,
    )
    .await
    .map_err(|err| anyhow::anyhow!("map failed: {err}"))?;
    println!("  squares: {:?}", squares);
    println!("  finished in {:?}", start.elapsed());

    Ok(())
}
