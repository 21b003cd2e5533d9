//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{AppConfig, BlockingQueue};
use dispatcher::ShutdownTrigger;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::summary::print_summary;

/// Execute the `run` command
pub async fn run_fanout(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        source = %config.source.addr,
        key = %config.source.key,
        sinks = config.sinks.len(),
        dequeue_timeout_ms = config.dispatch.dequeue_timeout_ms,
        "Configuration loaded"
    );

    run_with_queue(&config, open_queue(&config)?).await
}

#[cfg(feature = "redis")]
fn open_queue(config: &AppConfig) -> Result<queue_client::RedisQueue> {
    Ok(queue_client::RedisQueue::new("redis", config.source.clone()))
}

#[cfg(not(feature = "redis"))]
fn open_queue(config: &AppConfig) -> Result<queue_client::MemoryQueue> {
    anyhow::bail!(
        "no queue client for source {}: built without the `redis` feature",
        config.source.addr
    )
}

async fn run_with_queue<Q>(config: &AppConfig, queue: Q) -> Result<()>
where
    Q: BlockingQueue + Send + Sync + 'static,
{
    let dispatcher = dispatcher::create_dispatcher(config, queue)
        .context("Failed to start dispatcher")?;

    let trigger = dispatcher.shutdown_trigger();
    let listener = SignalListener::install()?;
    let signals = tokio::spawn(listener.forward(trigger.clone()));

    info!(workers = dispatcher.worker_count(), "Fan-out running, waiting for SIGINT/SIGTERM");
    let summary = dispatcher.run_until(trigger.fired()).await;
    signals.abort();

    print_summary(&summary);

    let failed = summary.workers.failures().count();
    if failed > 0 {
        anyhow::bail!("{failed} worker(s) ended with an error");
    }

    info!("Fanout finished");
    Ok(())
}

/// SIGINT / SIGTERM (Ctrl+C elsewhere), installed up front so failures surface
struct SignalListener {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl SignalListener {
    fn install() -> Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("Failed to install SIGTERM handler")?,
        })
    }

    async fn next(&mut self) -> &'static str {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        {
            tokio::select! {
                _ = ctrl_c => "SIGINT",
                _ = self.terminate.recv() => "SIGTERM",
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await;
            "Ctrl+C"
        }
    }

    /// Fire the trigger on the first signal; later signals are only logged
    async fn forward(mut self, trigger: ShutdownTrigger) {
        loop {
            let signal = self.next().await;
            if trigger.fire() {
                warn!(signal, "Received shutdown signal, stopping workers...");
            } else {
                warn!(signal, "Shutdown already in progress, ignoring signal");
            }
        }
    }
}
