//! Dispatcher - composition root for the fan-out graph
//!
//! Spawns one worker per sink plus the source consumer, and hands the
//! stop tokens and join handles to a `ShutdownCoordinator`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use contracts::{
    AppConfig, BlockingQueue, DeliverySink, DispatchConfig, Endpoint, RetryConfig, SinkConfig,
    SinkKind,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::error::DispatcherError;
use crate::handle::{SinkHandle, SinkSettings};
use crate::lifecycle::{WorkerRole, WorkerState};
use crate::metrics::{MetricsSnapshot, SinkMetrics, SourceMetrics, SourceSnapshot};
use crate::shutdown::{CompletionBarrier, ShutdownCoordinator, ShutdownReport, ShutdownTrigger};
use crate::sinks::LogSink;
#[cfg(feature = "redis")]
use crate::sinks::RedisSink;
use crate::source::{SourceConsumer, SourceSettings};

/// Builder for creating a Dispatcher.
///
/// Sinks are spawned as they are added, so this must run inside a tokio runtime.
pub struct DispatcherBuilder {
    dispatch: DispatchConfig,
    retry: RetryConfig,
    handles: Vec<SinkHandle>,
}

impl DispatcherBuilder {
    pub fn new(dispatch: DispatchConfig, retry: RetryConfig) -> Self {
        Self {
            dispatch,
            retry,
            handles: Vec::new(),
        }
    }

    /// Spawn a worker for every configured sink
    #[instrument(
        name = "dispatcher_builder_from_config",
        skip(config),
        fields(sink_count = config.sinks.len())
    )]
    pub fn from_config(config: &AppConfig) -> Result<Self, DispatcherError> {
        let mut builder = Self::new(config.dispatch.clone(), config.retry.clone());
        for (index, sink_config) in config.sinks.iter().enumerate() {
            builder
                .handles
                .push(create_sink_handle(index, sink_config, &config.retry)?);
        }
        Ok(builder)
    }

    /// Add a custom sink; it takes the next sink index
    pub fn add_sink<S: DeliverySink + Send + 'static>(
        mut self,
        sink: S,
        settings: SinkSettings,
    ) -> Self {
        self.handles.push(SinkHandle::spawn(sink, settings));
        self
    }

    pub fn sink_count(&self) -> usize {
        self.handles.len()
    }

    /// Backoff used by the source consumer
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Spawn the source consumer and wire up shutdown
    #[instrument(name = "dispatcher_start", skip_all, fields(key = %source.key, sinks = self.handles.len()))]
    pub fn start<Q>(self, queue: Q, source: &Endpoint) -> Dispatcher
    where
        Q: BlockingQueue + Send + Sync + 'static,
    {
        let parts: Vec<_> = self.handles.into_iter().map(SinkHandle::into_parts).collect();

        let source_stop = CancellationToken::new();
        let mut tokens = vec![("source".to_string(), source_stop.clone())];
        tokens.extend(parts.iter().map(|p| (p.name.clone(), p.stop.clone())));

        let settings = SourceSettings::new(source, &self.dispatch, &self.retry);
        let mut outputs = Vec::with_capacity(parts.len());
        let mut sink_metrics = Vec::with_capacity(parts.len());
        let mut sink_workers = Vec::with_capacity(parts.len());
        for part in parts {
            outputs.push(part.sender);
            sink_metrics.push((part.name.clone(), part.metrics));
            sink_workers.push((part.name, part.state, part.worker));
        }

        let consumer = SourceConsumer::new(queue, settings, outputs, source_stop);
        let source_state = consumer.state().clone();
        let source_metrics = Arc::clone(consumer.metrics());

        let mut barrier = CompletionBarrier::new();
        barrier.register("source", WorkerRole::Source, source_state, consumer.spawn());
        for (name, state, worker) in sink_workers {
            barrier.register(name, WorkerRole::Sink, state, worker);
        }

        info!(workers = barrier.len(), "Dispatcher started");

        Dispatcher {
            coordinator: ShutdownCoordinator::new(ShutdownTrigger::new(tokens), barrier),
            source_metrics,
            sink_metrics,
        }
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config, retry),
    fields(kind = ?config.kind)
)]
fn create_sink_handle(
    index: usize,
    config: &SinkConfig,
    retry: &RetryConfig,
) -> Result<SinkHandle, DispatcherError> {
    let settings = SinkSettings::from_config(index, config, retry);
    match config.kind {
        SinkKind::Log => {
            let sink = LogSink::new(&settings.name, config.endpoint.clone());
            Ok(SinkHandle::spawn(sink, settings))
        }
        #[cfg(feature = "redis")]
        SinkKind::Redis => {
            let sink = RedisSink::new(&settings.name, config.endpoint.clone());
            Ok(SinkHandle::spawn(sink, settings))
        }
        #[cfg(not(feature = "redis"))]
        SinkKind::Redis => Err(DispatcherError::sink_creation(
            &settings.name,
            "built without the `redis` feature",
        )),
    }
}

/// The running fan-out graph
pub struct Dispatcher {
    coordinator: ShutdownCoordinator,
    source_metrics: Arc<SourceMetrics>,
    sink_metrics: Vec<(String, Arc<SinkMetrics>)>,
}

impl Dispatcher {
    /// Sinks + 1
    pub fn worker_count(&self) -> usize {
        self.coordinator.worker_count()
    }

    pub fn sink_count(&self) -> usize {
        self.sink_metrics.len()
    }

    /// Workers whose completion has not been joined yet
    pub fn outstanding(&self) -> usize {
        self.coordinator.outstanding()
    }

    pub fn worker_states(&self) -> Vec<(String, WorkerState)> {
        self.coordinator.states()
    }

    /// Handle for firing the stop from elsewhere (signal handlers, tests)
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.coordinator.trigger()
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.sink_metrics
            .iter()
            .map(|(name, metrics)| (name.clone(), metrics.snapshot()))
            .collect()
    }

    pub fn source_metrics(&self) -> SourceSnapshot {
        self.source_metrics.snapshot()
    }

    /// Run until `signal` resolves (or every worker ends), then shut down
    pub async fn run_until<F>(self, signal: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        let Self {
            coordinator,
            source_metrics,
            sink_metrics,
        } = self;
        let workers = coordinator.run_until(signal).await;
        RunSummary::collect(workers, &source_metrics, &sink_metrics)
    }

    /// Stop now and wait for every worker
    pub async fn shutdown(self) -> RunSummary {
        let Self {
            coordinator,
            source_metrics,
            sink_metrics,
        } = self;
        let workers = coordinator.shutdown().await;
        RunSummary::collect(workers, &source_metrics, &sink_metrics)
    }
}

/// Convenience function to build and start a dispatcher from configuration
#[instrument(name = "dispatcher_create", skip(config, queue))]
pub fn create_dispatcher<Q>(config: &AppConfig, queue: Q) -> Result<Dispatcher, DispatcherError>
where
    Q: BlockingQueue + Send + Sync + 'static,
{
    Ok(DispatcherBuilder::from_config(config)?.start(queue, &config.source))
}

/// Final state of a run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub workers: ShutdownReport,
    pub source: SourceSnapshot,
    pub sinks: Vec<(String, MetricsSnapshot)>,
}

impl RunSummary {
    fn collect(
        workers: ShutdownReport,
        source: &SourceMetrics,
        sinks: &[(String, Arc<SinkMetrics>)],
    ) -> Self {
        Self {
            workers,
            source: source.snapshot(),
            sinks: sinks
                .iter()
                .map(|(name, metrics)| (name.clone(), metrics.snapshot()))
                .collect(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.workers.is_clean()
    }

    pub fn sink(&self, name: &str) -> Option<&MetricsSnapshot> {
        self.sinks
            .iter()
            .find(|(sink, _)| sink == name)
            .map(|(_, snapshot)| snapshot)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "source: dequeued={} empty_polls={} queue_retries={} cancelled_broadcasts={}",
            self.source.dequeued_count,
            self.source.empty_polls,
            self.source.queue_retries,
            self.source.broadcasts_cancelled
        )?;
        for (name, snapshot) in &self.sinks {
            writeln!(
                f,
                "sink {name}: delivered={} failed={} retried={} dropped={}",
                snapshot.delivered_count,
                snapshot.failure_count,
                snapshot.retry_count,
                snapshot.dropped_count
            )?;
        }
        write!(f, "{}", self.workers)
    }
}
