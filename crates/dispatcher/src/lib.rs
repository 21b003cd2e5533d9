//! # Dispatcher
//!
//! 数据分发模块。
//!
//! 负责：
//! - 从源队列阻塞出队 (`SourceConsumer`)
//! - 按 sink 顺序 fan-out 到每个 `SinkWorker`
//! - 可取消的投递通道，避免关停死锁
//! - 统一关停：停止令牌 + 完成屏障 (`ShutdownCoordinator`)

pub mod backoff;
pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod metrics;
pub mod shutdown;
pub mod sinks;
pub mod source;

pub use backoff::Backoff;
pub use channel::{delivery_channel, DeliveryReceiver, DeliverySender, SendOutcome};
pub use contracts::{BlockingQueue, DeliverySink, Item};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, RunSummary};
pub use error::DispatcherError;
pub use handle::{SinkHandle, SinkSettings};
pub use lifecycle::{StateCell, WorkerExit, WorkerOutcome, WorkerRole, WorkerState};
pub use metrics::{MetricsSnapshot, SinkMetrics, SourceMetrics, SourceSnapshot};
pub use shutdown::{
    CompletionBarrier, ShutdownCoordinator, ShutdownReport, ShutdownTrigger, WorkerReport,
};
pub use sinks::{LogSink, MemorySink};
#[cfg(feature = "redis")]
pub use sinks::RedisSink;
pub use source::{SourceConsumer, SourceSettings};
pub use tokio_util::sync::CancellationToken as StopToken;
