//! Layered error definitions
//!
//! Categorized by source: config / queue / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Queue Errors =====
    /// Could not reach the source queue
    #[error("queue connection error ({addr}): {message}")]
    QueueConnection { addr: String, message: String },

    /// Queue reachable, but a command failed
    #[error("queue command error on '{key}': {message}")]
    QueueCommand { key: String, message: String },

    // ===== Sink Errors =====
    /// Sink delivery error
    #[error("sink '{sink_name}' delivery error: {message}")]
    SinkDelivery { sink_name: String, message: String },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    /// Delivery did not finish in time
    #[error("sink '{sink_name}' delivery timed out after {timeout_ms}ms")]
    DeliveryTimeout { sink_name: String, timeout_ms: u64 },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create queue connection error
    pub fn queue_connection(addr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueueConnection {
            addr: addr.into(),
            message: message.into(),
        }
    }

    /// Create queue command error
    pub fn queue_command(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueueCommand {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create sink delivery error
    pub fn sink_delivery(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkDelivery {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create sink connection error
    pub fn sink_connection(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkConnection {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Whether the queue connection is gone and must be re-established
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::QueueConnection { .. } | Self::Io(_))
    }

    /// Whether the source should back off and try again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::QueueConnection { .. } | Self::QueueCommand { .. } | Self::Io(_)
        )
    }
}
