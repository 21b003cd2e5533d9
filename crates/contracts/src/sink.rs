//! DeliverySink trait - sink worker output interface
//!
//! Defines the abstract interface for sinks.

use crate::{ContractError, Item};

/// Delivery action applied by a sink worker.
///
/// All sink implementations must implement this trait.
#[trait_variant::make(DeliverySink: Send)]
pub trait LocalDeliverySink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Deliver one item
    ///
    /// # Errors
    /// Returns delivery error (should include context)
    async fn deliver(&mut self, item: &Item) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
