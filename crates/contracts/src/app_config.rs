//! AppConfig - Config Loader output
//!
//! Describes the whole fan-out graph: one source queue, N sinks, loop tuning
//! and the reconnect policy.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Queue the items are popped from
    pub source: Endpoint,

    /// Sinks every item is broadcast to, in index order
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,

    /// Source loop tuning
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Reconnect / redelivery backoff
    #[serde(default)]
    pub retry: RetryConfig,
}

impl AppConfig {
    /// Build a config with default tuning
    pub fn new(source: Endpoint, sinks: Vec<SinkConfig>) -> Self {
        Self {
            source,
            sinks,
            dispatch: DispatchConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    /// Resolved sink names, in index order
    pub fn sink_names(&self) -> Vec<String> {
        self.sinks
            .iter()
            .enumerate()
            .map(|(idx, sink)| sink.display_name(idx))
            .collect()
    }
}

/// Address, credential and list key of a queue-like endpoint
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// `host:port`
    pub addr: String,

    /// Empty means no AUTH
    #[serde(default)]
    pub password: String,

    /// List key
    #[serde(default)]
    pub key: String,
}

impl Endpoint {
    pub fn new(
        addr: impl Into<String>,
        password: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            addr: addr.into(),
            password: password.into(),
            key: key.into(),
        }
    }

    /// Password, if one is configured
    pub fn password(&self) -> Option<&str> {
        (!self.password.is_empty()).then_some(self.password.as_str())
    }
}

// Keeps credentials out of logs.
impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("addr", &self.addr)
            .field("password", &self.password().map(|_| "***"))
            .field("key", &self.key)
            .finish()
    }
}

/// One sink descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Where the sink lives
    #[serde(flatten)]
    pub endpoint: Endpoint,

    /// Display name (defaults to `sink-<index>`)
    #[serde(default)]
    pub name: Option<String>,

    /// Delivery action
    #[serde(default)]
    pub kind: SinkKind,

    /// What the worker does when delivery fails
    #[serde(default)]
    pub on_error: ErrorPolicy,

    /// Channel and delivery tuning
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl SinkConfig {
    /// Log sink pointing at `endpoint`
    pub fn log(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Default::default()
        }
    }

    /// Name used in logs and metrics
    pub fn display_name(&self, index: usize) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("sink-{index}"),
        }
    }
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Log the item
    #[default]
    Log,
    /// LPUSH the item onto the sink's key
    Redis,
}

/// Reaction to a failed delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Log, count and keep consuming
    #[default]
    LogAndContinue,
    /// Log and exit the worker with an error status
    Stop,
}

/// Per-sink channel and delivery tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Channel shape
    #[serde(default)]
    pub mode: DeliveryMode,

    /// Buffer size (buffered mode only)
    #[serde(default)]
    pub capacity: usize,

    /// Full-buffer behavior (buffered mode only)
    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Extra delivery attempts after the first failure
    #[serde(default)]
    pub retries: u32,

    /// Upper bound on a single delivery call
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::Rendezvous,
            capacity: 0,
            overflow: OverflowPolicy::Block,
            retries: 0,
            timeout_ms: None,
        }
    }
}

impl DeliveryConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Channel shape between the source and one sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Zero-capacity handoff: a send completes once the worker took the item
    #[default]
    Rendezvous,
    /// Bounded buffer of `capacity` items
    Buffered,
}

/// Behavior of a full buffered channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for room (backpressure)
    #[default]
    Block,
    /// Drop the incoming item, never wait
    DropNewest,
}

/// Source loop tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Bound on one blocking pop; also bounds shutdown latency
    #[serde(default = "default_dequeue_timeout_ms")]
    pub dequeue_timeout_ms: u64,
}

fn default_dequeue_timeout_ms() -> u64 {
    1000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            dequeue_timeout_ms: default_dequeue_timeout_ms(),
        }
    }
}

impl DispatchConfig {
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }
}

/// Exponential backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Consecutive failures tolerated before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_retries() -> u32 {
    10
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_retries: default_max_retries(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}
