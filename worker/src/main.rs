use bff_shared::config::Config;
use bff_shared::queue::broker_from_url;
use bff_worker::worker::run_queue;
use bff_worker::WorkerContext;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "bff-worker")]
#[command(about = "generation worker pool: dequeues jobs, invokes providers, finalizes artifacts")]
struct Cli {
    /// Process only this queue instead of all three (useful for scaling one
    /// queue family independently, spec §4.6).
    #[arg(long)]
    queue: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bff_shared::logging::init("bff_worker=info");

    let config = Config::from_env()?;
    let cli = Cli::parse();

    // Shares the same broker selection the gateway uses (spec §1): a real
    // `broker_url` gets a `RedisBroker` so the two binaries, run as
    // separate processes, see one queue; `memory://` is for single-process
    // dev runs and integration tests only.
    let broker = broker_from_url(&config.broker_url).await?;
    let ctx = Arc::new(WorkerContext::new(config.clone(), broker).await?);

    let queues: Vec<(&'static str, usize)> = vec![
        ("default", config.queues.default_concurrency),
        ("async_other", config.queues.async_other_concurrency),
        ("async_refine", config.queues.async_refine_concurrency),
    ];

    let selected: Vec<_> = match cli.queue.as_deref() {
        Some(name) => queues.into_iter().filter(|(q, _)| *q == name).collect(),
        None => queues,
    };

    if selected.is_empty() {
        anyhow::bail!("unknown queue name");
    }

    info!(?selected, "starting worker pools");
    let handles: Vec<_> = selected
        .into_iter()
        .map(|(queue, concurrency)| {
            let ctx = ctx.clone();
            tokio::spawn(async move { run_queue(ctx, queue, concurrency).await })
        })
        .collect();

    for handle in handles {
        handle.await?;
    }

    Ok(())
}
