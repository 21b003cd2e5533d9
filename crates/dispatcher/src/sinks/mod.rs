//! Sink implementations
//!
//! Contains LogSink, MemorySink and (feature `redis`) RedisSink.

mod log;
mod memory;
#[cfg(feature = "redis")]
mod redis_sink;

pub use self::log::LogSink;
pub use self::memory::MemorySink;
#[cfg(feature = "redis")]
pub use self::redis_sink::RedisSink;
