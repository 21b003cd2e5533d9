//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Data flow
//! - A `BlockingQueue` yields `Item`s to the source consumer
//! - Every `Item` is handed to each configured `DeliverySink`

mod app_config;
mod error;
mod item;
mod queue;
mod sink;

pub use app_config::*;
pub use error::*;
pub use item::Item;
pub use queue::{BlockingQueue, LocalBlockingQueue};
pub use sink::{DeliverySink, LocalDeliverySink};
