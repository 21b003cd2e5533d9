//! RedisSink - LPUSH each payload onto the sink's list

use contracts::{ContractError, DeliverySink, Endpoint, Item};
use queue_client::open_connection;
use redis::aio::MultiplexedConnection;
use tracing::{debug, instrument, warn};

/// Sink that pushes items onto a Redis list.
///
/// Connects on first delivery and again after a connection error.
pub struct RedisSink {
    name: String,
    endpoint: Endpoint,
    conn: Option<MultiplexedConnection>,
}

impl RedisSink {
    pub fn new(name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            name: name.into(),
            endpoint,
            conn: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn connection(&mut self) -> Result<&mut MultiplexedConnection, ContractError> {
        if self.conn.is_none() {
            let conn = open_connection(&self.endpoint)
                .await
                .map_err(|e| ContractError::sink_connection(&self.name, e.to_string()))?;
            debug!(sink = %self.name, addr = %self.endpoint.addr, "RedisSink connected");
            self.conn = Some(conn);
        }
        self.conn
            .as_mut()
            .ok_or_else(|| ContractError::sink_connection(&self.name, "not connected"))
    }
}

impl DeliverySink for RedisSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "redis_sink_deliver", skip(self, item), fields(sink = %self.name, seq = item.seq))]
    async fn deliver(&mut self, item: &Item) -> Result<(), ContractError> {
        let key = self.endpoint.key.clone();
        let conn = self.connection().await?;

        let pushed: Result<i64, redis::RedisError> = redis::cmd("LPUSH")
            .arg(&key)
            .arg(item.payload.as_ref())
            .query_async(conn)
            .await;

        match pushed {
            Ok(len) => {
                debug!(key = %key, list_len = len, "Item pushed");
                Ok(())
            }
            Err(err) if err.is_io_error() || err.is_connection_dropped() => {
                warn!(sink = %self.name, error = %err, "Dropping redis connection");
                self.conn = None;
                Err(ContractError::sink_connection(&self.name, err.to_string()))
            }
            Err(err) => Err(ContractError::sink_delivery(&self.name, err.to_string())),
        }
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.conn = None;
        Ok(())
    }
}
