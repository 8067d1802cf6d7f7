use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use safecache::{
    cli::{self, Args, Runtime},
    logger, ExpiringCache, SnapshotCreator,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.load_config().context("failed to load config")?;

    if let Runtime::Inspect { file } = &args.subcommand {
        println!("{}", cli::inspect(file.clone()).await?);
        return Ok(());
    }

    let _guard = logger::init(&config.log).context("failed to initialize logger")?;

    let cache: Arc<ExpiringCache<String>> = Arc::new(ExpiringCache::with_config(config.cache.clone()));
    let snapshots = config.snapshot.path.as_ref().map(SnapshotCreator::new);
    if let Some(creator) = &snapshots {
        creator
            .restore(&cache)
            .await
            .with_context(|| format!("failed to restore {}", creator.path().display()))?;
    }

    let shutdown = CancellationToken::new();
    let sweeper = cache.spawn_clean(shutdown.clone());
    let snapshotter = snapshots.map(|creator| {
        let cache = Arc::clone(&cache);
        let shutdown = shutdown.clone();
        let period = config.snapshot.interval();
        tokio::spawn(async move { creator.run(cache, period, shutdown).await })
    });

    match args.subcommand {
        Runtime::Run => {
            info!("cache running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
        }
        Runtime::Demo {
            iterations,
            keys,
            ttl_ms,
            pause_ms,
        } => {
            let stats = cli::run_demo(
                &cache,
                iterations,
                keys,
                Duration::from_millis(ttl_ms),
                Duration::from_millis(pause_ms),
            )
            .await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Runtime::Inspect { .. } => {}
    }

    shutdown.cancel();
    sweeper.await?;
    if let Some(task) = snapshotter {
        task.await?;
    }
    info!(entries = cache.len(), "cache stopped");

    Ok(())
}
