//! DeliveryChannel - single-producer single-consumer link from the source to one sink
//!
//! Two shapes:
//! - rendezvous: a send resolves only once the sink worker has taken the item
//! - buffered: bounded `mpsc`, full buffer either blocks or drops the newest item
//!
//! Every send takes the producer's stop token, so a blocked send never
//! outlives a stop request.

use std::sync::Arc;

use contracts::{DeliveryConfig, DeliveryMode, Item, OverflowPolicy};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::metrics::SinkMetrics;

/// Result of one cancellable send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Item handed over (rendezvous) or buffered
    Accepted,
    /// Buffer full under `drop_newest`
    Dropped,
    /// Sink worker already exited
    Closed,
    /// Stop token fired before the send resolved
    Cancelled,
}

impl SendOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Item plus the rendezvous acknowledgement, if any
struct Envelope {
    item: Item,
    handoff: Option<oneshot::Sender<()>>,
}

#[derive(Debug, Clone, Copy)]
enum ChannelKind {
    Rendezvous,
    Buffered(OverflowPolicy),
}

/// Producer half, owned by the source consumer
pub struct DeliverySender {
    sink: String,
    tx: mpsc::Sender<Envelope>,
    kind: ChannelKind,
    metrics: Arc<SinkMetrics>,
}

/// Consumer half, owned by the sink worker
pub struct DeliveryReceiver {
    rx: mpsc::Receiver<Envelope>,
}

/// Create the channel for one sink
pub fn delivery_channel(
    sink: impl Into<String>,
    config: &DeliveryConfig,
    metrics: Arc<SinkMetrics>,
) -> (DeliverySender, DeliveryReceiver) {
    let (kind, capacity) = match config.mode {
        DeliveryMode::Rendezvous => (ChannelKind::Rendezvous, 1),
        DeliveryMode::Buffered => (ChannelKind::Buffered(config.overflow), config.capacity.max(1)),
    };
    let (tx, rx) = mpsc::channel(capacity);

    let sender = DeliverySender {
        sink: sink.into(),
        tx,
        kind,
        metrics,
    };
    (sender, DeliveryReceiver { rx })
}

impl DeliverySender {
    pub fn sink_name(&self) -> &str {
        &self.sink
    }

    /// True once the receiving worker has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Send `item`, giving up as soon as `stop` fires.
    ///
    /// Items that do not reach the sink are counted on the sink's metrics.
    pub async fn send(&self, item: Item, stop: &CancellationToken) -> SendOutcome {
        let outcome = match self.kind {
            ChannelKind::Rendezvous => self.send_rendezvous(item, stop).await,
            ChannelKind::Buffered(OverflowPolicy::Block) => self.send_blocking(item, stop).await,
            ChannelKind::Buffered(OverflowPolicy::DropNewest) => self.send_or_drop(item),
        };

        match outcome {
            SendOutcome::Accepted => {}
            SendOutcome::Dropped => self.record_dropped("overflow"),
            SendOutcome::Closed => self.record_dropped("closed"),
            SendOutcome::Cancelled => self.record_dropped("shutdown"),
        }
        outcome
    }

    /// Count an item this sink will never see
    pub(crate) fn record_dropped(&self, reason: &'static str) {
        self.metrics.add_dropped_count(1);
        observability::record_item_dropped(&self.sink, reason, 1);
    }

    async fn send_rendezvous(&self, item: Item, stop: &CancellationToken) -> SendOutcome {
        let (ack_tx, ack_rx) = oneshot::channel();
        let envelope = Envelope {
            item,
            handoff: Some(ack_tx),
        };

        let handoff = async {
            self.tx.send(envelope).await.map_err(|_| ())?;
            ack_rx.await.map_err(|_| ())
        };

        tokio::select! {
            biased;
            result = handoff => match result {
                Ok(()) => SendOutcome::Accepted,
                Err(()) => SendOutcome::Closed,
            },
            _ = stop.cancelled() => SendOutcome::Cancelled,
        }
    }

    async fn send_blocking(&self, item: Item, stop: &CancellationToken) -> SendOutcome {
        let envelope = Envelope {
            item,
            handoff: None,
        };

        tokio::select! {
            biased;
            result = self.tx.send(envelope) => match result {
                Ok(()) => SendOutcome::Accepted,
                Err(_) => SendOutcome::Closed,
            },
            _ = stop.cancelled() => SendOutcome::Cancelled,
        }
    }

    fn send_or_drop(&self, item: Item) -> SendOutcome {
        let envelope = Envelope {
            item,
            handoff: None,
        };

        match self.tx.try_send(envelope) {
            Ok(()) => SendOutcome::Accepted,
            Err(mpsc::error::TrySendError::Full(_)) => SendOutcome::Dropped,
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }
}

impl DeliveryReceiver {
    /// Next item, `None` once the producer is gone.
    ///
    /// Cancel safe. Rendezvous items whose send was already withdrawn are
    /// skipped; the producer counted them.
    pub async fn recv(&mut self) -> Option<Item> {
        loop {
            let envelope = self.rx.recv().await?;
            match envelope.handoff {
                None => return Some(envelope.item),
                Some(ack) => {
                    if ack.send(()).is_ok() {
                        return Some(envelope.item);
                    }
                }
            }
        }
    }

    /// Items waiting in the buffer
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Refuse further sends and discard what is buffered.
    ///
    /// Returns the number of accepted items that will never be delivered.
    pub fn close_and_drain(&mut self) -> usize {
        self.rx.close();

        let mut dropped = 0;
        while let Ok(envelope) = self.rx.try_recv() {
            // a pending rendezvous sender sees `Closed` and counts it
            if envelope.handoff.is_none() {
                dropped += 1;
            }
        }
        dropped
    }
}
