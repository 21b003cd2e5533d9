//! # Queue Client
//!
//! Source-side queue collaborators.
//!
//! Responsibilities:
//! - `MemoryQueue`: in-process blocking list queue (tests, local runs)
//! - `RedisQueue`: `BRPOP` against a Redis list (feature `redis`)
//!
//! Both implement `contracts::BlockingQueue`, so the source consumer never
//! knows which one it is draining.
//!
//! ## Mock Testing
//!
//! ```ignore
//! use queue_client::MemoryQueue;
//!
//! let queue = MemoryQueue::new("memory");
//! queue.push("q", "hello");
//! ```

mod memory;
#[cfg(feature = "redis")]
mod redis_queue;

pub use contracts::{BlockingQueue, Item};
pub use memory::MemoryQueue;
#[cfg(feature = "redis")]
pub use redis_queue::{open_connection, RedisQueue};
