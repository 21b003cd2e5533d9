//! Redis list queue drained with `BRPOP`

use std::time::Duration;

use contracts::{BlockingQueue, ContractError, Endpoint, Item};
use redis::aio::MultiplexedConnection;
use redis::{ConnectionInfo, IntoConnectionInfo, RedisError};
use tracing::{debug, instrument, warn};

/// Open a multiplexed connection to `endpoint` and PING it.
///
/// AUTH uses the endpoint password when one is set.
#[instrument(name = "redis_open_connection", skip(endpoint), fields(addr = %endpoint.addr))]
pub async fn open_connection(endpoint: &Endpoint) -> Result<MultiplexedConnection, ContractError> {
    let info = connection_info(endpoint)
        .map_err(|e| ContractError::queue_connection(&endpoint.addr, e.to_string()))?;
    let client = redis::Client::open(info)
        .map_err(|e| ContractError::queue_connection(&endpoint.addr, e.to_string()))?;

    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| ContractError::queue_connection(&endpoint.addr, e.to_string()))?;

    let pong: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(|e| ContractError::queue_connection(&endpoint.addr, e.to_string()))?;
    debug!(addr = %endpoint.addr, reply = %pong, "redis connection ready");

    Ok(conn)
}

fn connection_info(endpoint: &Endpoint) -> Result<ConnectionInfo, RedisError> {
    let mut info = format!("redis://{}", endpoint.addr).into_connection_info()?;
    info.redis.password = endpoint.password().map(str::to_owned);
    Ok(info)
}

/// Source queue backed by a Redis list
pub struct RedisQueue {
    name: String,
    endpoint: Endpoint,
    conn: Option<MultiplexedConnection>,
}

impl RedisQueue {
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

    fn classify(&self, key: &str, err: RedisError) -> ContractError {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            ContractError::queue_connection(&self.endpoint.addr, err.to_string())
        } else {
            ContractError::queue_command(key, err.to_string())
        }
    }
}

impl BlockingQueue for RedisQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), ContractError> {
        self.conn = None;
        let conn = open_connection(&self.endpoint).await?;
        self.conn = Some(conn);
        Ok(())
    }

    async fn pop(&mut self, key: &str, timeout: Duration) -> Result<Option<Item>, ContractError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| ContractError::queue_connection(&self.endpoint.addr, "not connected"))?;

        // BRPOP takes fractional seconds; 0 would block forever.
        let timeout_secs = timeout.as_secs_f64().max(0.001);
        let reply: Result<Option<(String, Vec<u8>)>, RedisError> = redis::cmd("BRPOP")
            .arg(key)
            .arg(timeout_secs)
            .query_async(conn)
            .await;

        match reply {
            Ok(Some((list, payload))) => Ok(Some(Item::new(list, payload))),
            Ok(None) => Ok(None),
            Err(err) => {
                let err = self.classify(key, err);
                if matches!(err, ContractError::QueueConnection { .. }) {
                    warn!(queue = %self.name, error = %err, "dropping redis connection");
                    self.conn = None;
                }
                Err(err)
            }
        }
    }
}
