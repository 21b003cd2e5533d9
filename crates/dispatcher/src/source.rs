//! SourceConsumer - pops items from the source queue and broadcasts them

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use contracts::{BlockingQueue, ContractError, DispatchConfig, Endpoint, Item, RetryConfig};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::backoff::Backoff;
use crate::channel::{DeliverySender, SendOutcome};
use crate::lifecycle::{StateCell, WorkerExit, WorkerOutcome, WorkerRole, WorkerState};
use crate::metrics::SourceMetrics;

/// Immutable source settings, moved into the worker at spawn
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Used in logs
    pub name: String,
    /// List key to pop from
    pub key: String,
    /// Bound on one pop; also bounds shutdown latency
    pub dequeue_timeout: Duration,
    /// Reconnect policy
    pub retry: RetryConfig,
}

impl SourceSettings {
    pub fn new(endpoint: &Endpoint, dispatch: &DispatchConfig, retry: &RetryConfig) -> Self {
        Self {
            name: "source".to_string(),
            key: endpoint.key.clone(),
            dequeue_timeout: dispatch.dequeue_timeout(),
            retry: retry.clone(),
        }
    }
}

/// The single producer of the fan-out graph
pub struct SourceConsumer<Q> {
    queue: Q,
    settings: SourceSettings,
    outputs: Vec<DeliverySender>,
    stop: CancellationToken,
    state: StateCell,
    metrics: Arc<SourceMetrics>,
}

impl<Q> SourceConsumer<Q>
where
    Q: BlockingQueue + Send + Sync + 'static,
{
    /// `outputs` are in sink-index order; that is the broadcast order.
    pub fn new(
        queue: Q,
        settings: SourceSettings,
        outputs: Vec<DeliverySender>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            queue,
            settings,
            outputs,
            stop,
            state: StateCell::new(),
            metrics: Arc::new(SourceMetrics::new()),
        }
    }

    pub fn state(&self) -> &StateCell {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<SourceMetrics> {
        &self.metrics
    }

    /// Spawn the consumer loop as a task
    pub fn spawn(self) -> JoinHandle<WorkerOutcome> {
        tokio::spawn(self.run())
    }

    /// Run until stopped or the queue is given up on.
    ///
    /// Dropping the outputs on exit closes every sink channel.
    #[instrument(
        name = "source_consumer_loop",
        skip(self),
        fields(
            worker = %self.settings.name,
            queue = %self.queue.name(),
            key = %self.settings.key,
            sinks = self.outputs.len()
        )
    )]
    pub async fn run(mut self) -> WorkerOutcome {
        info!("Source consumer started");

        let mut backoff = Backoff::new(self.settings.retry.clone());
        let mut connected = false;
        let mut seq: u64 = 0;

        let exit = loop {
            if self.stop.is_cancelled() {
                break WorkerExit::Clean;
            }

            if self.all_outputs_closed() {
                error!("Every sink has exited, no longer dequeuing");
                break WorkerExit::Failed("all sinks exited".to_string());
            }

            if !connected {
                let result = tokio::select! {
                    biased;
                    _ = self.stop.cancelled() => break WorkerExit::Clean,
                    result = self.queue.connect() => result,
                };
                match result {
                    Ok(()) => {
                        connected = true;
                        info!("Queue connected");
                    }
                    Err(e) => match self.back_off(&mut backoff, e).await {
                        ControlFlow::Continue(()) => continue,
                        ControlFlow::Break(exit) => break exit,
                    },
                }
            }

            // never raced with stop: an item taken off the queue is always broadcast
            let popped = self
                .queue
                .pop(&self.settings.key, self.settings.dequeue_timeout)
                .await;

            match popped {
                Ok(None) => {
                    backoff.reset();
                    self.metrics.inc_empty_polls();
                    observability::record_dequeue_empty(&self.settings.key);
                }
                Ok(Some(item)) => {
                    backoff.reset();
                    seq += 1;
                    self.metrics.inc_dequeued_count();
                    observability::record_item_dequeued(&self.settings.key);

                    if let ControlFlow::Break(exit) = self.broadcast(item.with_seq(seq)).await {
                        break exit;
                    }
                }
                Err(e) => {
                    if e.is_connection_lost() {
                        connected = false;
                    }
                    match self.back_off(&mut backoff, e).await {
                        ControlFlow::Continue(()) => continue,
                        ControlFlow::Break(exit) => break exit,
                    }
                }
            }
        };

        self.finish(exit)
    }

    /// Send `item` to every sink in index order.
    ///
    /// Breaks only when the stop token fires mid-broadcast.
    async fn broadcast(&self, item: Item) -> ControlFlow<WorkerExit> {
        for (idx, output) in self.outputs.iter().enumerate() {
            match output.send(item.clone(), &self.stop).await {
                SendOutcome::Accepted => {}
                SendOutcome::Dropped => {
                    debug!(sink = output.sink_name(), seq = item.seq, "Sink buffer full, item dropped");
                }
                SendOutcome::Closed => {
                    warn!(sink = output.sink_name(), seq = item.seq, "Sink already exited, item not delivered");
                }
                SendOutcome::Cancelled => {
                    let skipped = &self.outputs[idx + 1..];
                    for rest in skipped {
                        rest.record_dropped("shutdown");
                    }
                    self.metrics.inc_broadcasts_cancelled();
                    warn!(
                        seq = item.seq,
                        undelivered = skipped.len() + 1,
                        "Stop requested mid-broadcast"
                    );
                    return ControlFlow::Break(WorkerExit::Clean);
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// True when there are sinks and none of them is still receiving
    fn all_outputs_closed(&self) -> bool {
        !self.outputs.is_empty() && self.outputs.iter().all(DeliverySender::is_closed)
    }

    /// Sleep before the next attempt, or give up
    async fn back_off(&self, backoff: &mut Backoff, err: ContractError) -> ControlFlow<WorkerExit> {
        if !err.is_retryable() {
            error!(error = %err, "Queue error is not retryable");
            return ControlFlow::Break(WorkerExit::Failed(err.to_string()));
        }

        let Some(delay) = backoff.next_delay() else {
            error!(attempts = backoff.attempt(), error = %err, "Queue retries exhausted");
            return ControlFlow::Break(WorkerExit::Failed(format!(
                "queue unreachable after {} retries: {err}",
                backoff.attempt()
            )));
        };

        let delay_ms = delay.as_millis() as u64;
        self.metrics.inc_queue_retries();
        observability::record_queue_retry(backoff.attempt(), delay_ms);
        warn!(attempt = backoff.attempt(), delay_ms, error = %err, "Queue error, retrying");

        tokio::select! {
            biased;
            _ = self.stop.cancelled() => ControlFlow::Break(WorkerExit::Clean),
            _ = tokio::time::sleep(delay) => ControlFlow::Continue(()),
        }
    }

    fn finish(mut self, exit: WorkerExit) -> WorkerOutcome {
        self.state.advance(WorkerState::Stopping);
        self.outputs.clear();
        self.state.advance(WorkerState::Stopped);

        observability::record_worker_stopped(WorkerRole::Source.as_str(), exit.status());
        match &exit {
            WorkerExit::Clean => info!(
                dequeued = self.metrics.dequeued_count(),
                "Source consumer stopped"
            ),
            other => error!(
                dequeued = self.metrics.dequeued_count(),
                exit = %other,
                "Source consumer failed"
            ),
        }
        WorkerOutcome::new(exit)
    }
}
