//! SinkHandle - one sink worker with its own delivery channel and stop token

use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{
    ContractError, DeliveryConfig, DeliverySink, ErrorPolicy, Item, RetryConfig, SinkConfig,
};
use observability::RunningStats;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::backoff::Backoff;
use crate::channel::{delivery_channel, DeliveryReceiver, DeliverySender};
use crate::lifecycle::{StateCell, WorkerExit, WorkerOutcome, WorkerRole, WorkerState};
use crate::metrics::SinkMetrics;

/// Immutable per-sink settings, moved into the worker at spawn
#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub name: String,
    pub on_error: ErrorPolicy,
    pub delivery: DeliveryConfig,
    /// Backoff curve for delivery retries (`delivery.retries` caps the count)
    pub retry: RetryConfig,
}

impl SinkSettings {
    /// Defaults: rendezvous, log-and-continue, no retries
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_error: ErrorPolicy::default(),
            delivery: DeliveryConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    pub fn from_config(index: usize, config: &SinkConfig, retry: &RetryConfig) -> Self {
        Self {
            name: config.display_name(index),
            on_error: config.on_error,
            delivery: config.delivery.clone(),
            retry: retry.clone(),
        }
    }

    pub fn with_on_error(mut self, on_error: ErrorPolicy) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Handle to a running sink worker
pub struct SinkHandle {
    name: String,
    /// Producer half, handed to the source consumer
    tx: DeliverySender,
    stop: CancellationToken,
    state: StateCell,
    metrics: Arc<SinkMetrics>,
    worker_handle: JoinHandle<WorkerOutcome>,
}

/// Pieces the dispatcher wires into the source and the barrier
pub(crate) struct SinkParts {
    pub name: String,
    pub sender: DeliverySender,
    pub stop: CancellationToken,
    pub state: StateCell,
    pub metrics: Arc<SinkMetrics>,
    pub worker: JoinHandle<WorkerOutcome>,
}

impl SinkHandle {
    /// Create the channel and spawn the worker task
    pub fn spawn<S: DeliverySink + Send + 'static>(sink: S, settings: SinkSettings) -> Self {
        let name = settings.name.clone();
        let metrics = Arc::new(SinkMetrics::new());
        let (tx, rx) = delivery_channel(&name, &settings.delivery, Arc::clone(&metrics));
        let stop = CancellationToken::new();
        let state = StateCell::new();

        let worker = SinkWorker {
            sink,
            rx,
            settings,
            stop: stop.clone(),
            state: state.clone(),
            metrics: Arc::clone(&metrics),
        };
        let worker_handle = tokio::spawn(worker.run());

        Self {
            name,
            tx,
            stop,
            state,
            metrics,
            worker_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    pub fn state(&self) -> &StateCell {
        &self.state
    }

    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    pub fn sender(&self) -> &DeliverySender {
        &self.tx
    }

    pub(crate) fn into_parts(self) -> SinkParts {
        SinkParts {
            name: self.name,
            sender: self.tx,
            stop: self.stop,
            state: self.state,
            metrics: self.metrics,
            worker: self.worker_handle,
        }
    }

    /// Stop the worker and wait for it
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) -> WorkerOutcome {
        self.stop.cancel();
        drop(self.tx);

        match self.worker_handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(sink = %self.name, error = ?e, "Worker task panicked");
                WorkerOutcome::new(WorkerExit::Panicked(e.to_string()))
            }
        }
    }
}

enum Delivery {
    Delivered(Duration),
    Failed(ContractError),
    /// Stop fired while the delivery was in flight
    Abandoned,
}

struct SinkWorker<S> {
    sink: S,
    rx: DeliveryReceiver,
    settings: SinkSettings,
    stop: CancellationToken,
    state: StateCell,
    metrics: Arc<SinkMetrics>,
}

impl<S: DeliverySink + Send> SinkWorker<S> {
    #[instrument(name = "sink_worker_loop", skip(self), fields(sink = %self.settings.name))]
    async fn run(mut self) -> WorkerOutcome {
        debug!("Sink worker started");
        let name = self.settings.name.clone();
        let mut latency = RunningStats::default();

        let exit = loop {
            let item = tokio::select! {
                _ = self.stop.cancelled() => {
                    debug!("Stop requested");
                    break WorkerExit::Clean;
                }
                received = self.rx.recv() => match received {
                    Some(item) => item,
                    None => {
                        debug!("Input closed");
                        break WorkerExit::Clean;
                    }
                },
            };

            match self.deliver(&item).await {
                Delivery::Delivered(elapsed) => {
                    let ms = elapsed.as_secs_f64() * 1000.0;
                    latency.push(ms);
                    self.metrics.inc_delivered_count();
                    observability::record_item_delivered(&name, true);
                    observability::record_delivery_latency_ms(&name, ms);
                }
                Delivery::Failed(e) => {
                    self.metrics.inc_failure_count();
                    observability::record_item_delivered(&name, false);
                    error!(seq = item.seq, error = %e, "Delivery failed");

                    if self.settings.on_error == ErrorPolicy::Stop {
                        break WorkerExit::Failed(e.to_string());
                    }
                }
                Delivery::Abandoned => {
                    self.metrics.add_dropped_count(1);
                    observability::record_item_dropped(&name, "shutdown", 1);
                    warn!(seq = item.seq, "Stop requested during delivery, item abandoned");
                    break WorkerExit::Clean;
                }
            }
        };

        self.state.advance(WorkerState::Stopping);

        let drained = self.rx.close_and_drain() as u64;
        if drained > 0 {
            self.metrics.add_dropped_count(drained);
            observability::record_item_dropped(&name, "shutdown", drained);
            warn!(dropped = drained, "Buffered items dropped on shutdown");
        }

        if let Err(e) = self.sink.close().await {
            error!(error = %e, "Close failed on shutdown");
        }

        self.state.advance(WorkerState::Stopped);
        observability::record_worker_stopped(WorkerRole::Sink.as_str(), exit.status());

        let summary = latency.summary();
        info!(
            delivered = self.metrics.delivered_count(),
            failures = self.metrics.failure_count(),
            dropped = self.metrics.dropped_count(),
            latency_ms = %summary,
            exit = %exit,
            "Sink worker stopped"
        );

        WorkerOutcome {
            exit,
            latency: Some(summary),
        }
    }

    /// Deliver with the configured retries and timeout, abandoning on stop
    async fn deliver(&mut self, item: &Item) -> Delivery {
        let started = Instant::now();
        let mut backoff = Backoff::with_max_retries(&self.settings.retry, self.settings.delivery.retries);

        loop {
            let attempt = tokio::select! {
                biased;
                _ = self.stop.cancelled() => return Delivery::Abandoned,
                result = deliver_once(&mut self.sink, item, &self.settings) => result,
            };

            let err = match attempt {
                Ok(()) => return Delivery::Delivered(started.elapsed()),
                Err(e) => e,
            };

            let Some(delay) = backoff.next_delay() else {
                return Delivery::Failed(err);
            };
            self.metrics.inc_retry_count();
            warn!(
                seq = item.seq,
                attempt = backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Delivery failed, retrying"
            );

            tokio::select! {
                biased;
                _ = self.stop.cancelled() => return Delivery::Abandoned,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

async fn deliver_once<S: DeliverySink>(
    sink: &mut S,
    item: &Item,
    settings: &SinkSettings,
) -> Result<(), ContractError> {
    match settings.delivery.timeout() {
        None => sink.deliver(item).await,
        Some(limit) => tokio::time::timeout(limit, sink.deliver(item))
            .await
            .map_err(|_| ContractError::DeliveryTimeout {
                sink_name: settings.name.clone(),
                timeout_ms: limit.as_millis() as u64,
            })?,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
    use tokio::time::{sleep, timeout};

    /// Mock sink for testing
    struct MockSink {
        name: String,
        write_count: Arc<AtomicU64>,
        /// Fail this many calls before succeeding
        failures_left: Arc<AtomicU32>,
        delay_ms: u64,
    }

    impl MockSink {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                write_count: Arc::new(AtomicU64::new(0)),
                failures_left: Arc::new(AtomicU32::new(0)),
                delay_ms: 0,
            }
        }
    }

    impl DeliverySink for MockSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn deliver(&mut self, _item: &Item) -> Result<(), ContractError> {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            let failing = self
                .failures_left
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(ContractError::sink_delivery(&self.name, "mock failure"));
            }
            self.write_count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            initial_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
            max_retries: 10,
        }
    }

    fn item(seq: u64) -> Item {
        Item::new("q", format!("item-{seq}")).with_seq(seq)
    }

    #[tokio::test]
    async fn test_sink_handle_basic() {
        let sink = MockSink::new("test");
        let write_count = Arc::clone(&sink.write_count);
        let handle = SinkHandle::spawn(sink, SinkSettings::new("test"));
        let stop = CancellationToken::new();

        for seq in 1..=5 {
            assert!(handle.sender().send(item(seq), &stop).await.is_accepted());
        }

        let outcome = handle.shutdown().await;
        assert!(outcome.exit.is_clean());
        assert_eq!(write_count.load(Ordering::Relaxed), 5);
        assert_eq!(outcome.latency.map(|l| l.count), Some(5));
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        let sink = MockSink::new("failing");
        sink.failures_left.store(u32::MAX, Ordering::Relaxed);
        let handle = SinkHandle::spawn(sink, SinkSettings::new("failing"));
        let stop = CancellationToken::new();

        for seq in 1..=3 {
            handle.sender().send(item(seq), &stop).await;
        }
        sleep(Duration::from_millis(20)).await;

        assert_eq!(handle.metrics().failure_count(), 3);
        assert_eq!(handle.state().get(), WorkerState::Running);
        assert!(handle.shutdown().await.exit.is_clean());
    }

    #[tokio::test]
    async fn test_stop_policy_exits_with_error() {
        let sink = MockSink::new("strict");
        sink.failures_left.store(1, Ordering::Relaxed);
        let settings = SinkSettings::new("strict").with_on_error(ErrorPolicy::Stop);
        let handle = SinkHandle::spawn(sink, settings);
        let stop = CancellationToken::new();

        handle.sender().send(item(1), &stop).await;
        sleep(Duration::from_millis(20)).await;

        assert_eq!(handle.state().get(), WorkerState::Stopped);
        let outcome = handle.sender().send(item(2), &stop).await;
        assert_eq!(outcome, crate::SendOutcome::Closed);

        let outcome = handle.shutdown().await;
        assert!(matches!(outcome.exit, WorkerExit::Failed(_)));
    }

    #[tokio::test]
    async fn test_delivery_retries_then_succeeds() {
        let sink = MockSink::new("flaky");
        sink.failures_left.store(2, Ordering::Relaxed);
        let write_count = Arc::clone(&sink.write_count);
        let delivery = DeliveryConfig {
            retries: 3,
            ..Default::default()
        };
        let settings = SinkSettings::new("flaky")
            .with_delivery(delivery)
            .with_retry(fast_retry());
        let handle = SinkHandle::spawn(sink, settings);

        handle.sender().send(item(1), &CancellationToken::new()).await;
        sleep(Duration::from_millis(50)).await;

        assert_eq!(write_count.load(Ordering::Relaxed), 1);
        assert_eq!(handle.metrics().retry_count(), 2);
        assert_eq!(handle.metrics().failure_count(), 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_delivery_timeout_counts_as_failure() {
        let mut sink = MockSink::new("slow");
        sink.delay_ms = 200;
        let delivery = DeliveryConfig {
            timeout_ms: Some(10),
            ..Default::default()
        };
        let handle = SinkHandle::spawn(sink, SinkSettings::new("slow").with_delivery(delivery));

        handle.sender().send(item(1), &CancellationToken::new()).await;
        sleep(Duration::from_millis(60)).await;

        assert_eq!(handle.metrics().failure_count(), 1);
        assert_eq!(handle.metrics().delivered_count(), 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_abandons_stalled_delivery() {
        let mut sink = MockSink::new("stalled");
        sink.delay_ms = 60_000;
        let handle = SinkHandle::spawn(sink, SinkSettings::new("stalled"));

        handle.sender().send(item(1), &CancellationToken::new()).await;
        let metrics = Arc::clone(handle.metrics());

        let outcome = timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .unwrap();
        assert!(outcome.exit.is_clean());
        assert_eq!(metrics.dropped_count(), 1);
    }

    #[tokio::test]
    async fn test_buffered_items_dropped_on_stop() {
        let mut sink = MockSink::new("buffered");
        sink.delay_ms = 60_000;
        let delivery = DeliveryConfig {
            mode: contracts::DeliveryMode::Buffered,
            capacity: 4,
            ..Default::default()
        };
        let handle = SinkHandle::spawn(sink, SinkSettings::new("buffered").with_delivery(delivery));
        let stop = CancellationToken::new();

        for seq in 1..=4 {
            assert!(handle.sender().send(item(seq), &stop).await.is_accepted());
        }
        sleep(Duration::from_millis(20)).await;
        let metrics = Arc::clone(handle.metrics());

        handle.shutdown().await;
        // one abandoned mid-delivery, three still buffered
        assert_eq!(metrics.dropped_count(), 4);
    }
}
