//! BlockingQueue trait - source consumer input interface

use std::time::Duration;

use crate::{ContractError, Item};

/// External list-like queue with a blocking pop.
///
/// Implementations are owned by exactly one source consumer.
#[trait_variant::make(BlockingQueue: Send)]
pub trait LocalBlockingQueue {
    /// Queue name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Establish (or re-establish) the connection.
    ///
    /// # Errors
    /// Returns `QueueConnection` when the queue is unreachable
    async fn connect(&mut self) -> Result<(), ContractError>;

    /// Pop one item from `key`, waiting at most `timeout`.
    ///
    /// `Ok(None)` means the timeout elapsed with nothing to pop; it is not an error.
    async fn pop(&mut self, key: &str, timeout: Duration) -> Result<Option<Item>, ContractError>;
}
