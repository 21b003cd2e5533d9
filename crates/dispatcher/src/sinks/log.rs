//! LogSink - logs each item via tracing

use contracts::{ContractError, DeliverySink, Endpoint, Item};
use tracing::{info, instrument};

/// Longest payload prefix written to the log
const PREVIEW_LIMIT: usize = 256;

/// Sink that logs its identity and the item payload
pub struct LogSink {
    name: String,
    endpoint: Endpoint,
}

impl LogSink {
    pub fn new(name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            name: name.into(),
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn preview(item: &Item) -> String {
        let text = item.text();
        match text.char_indices().nth(PREVIEW_LIMIT) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.into_owned(),
        }
    }
}

impl DeliverySink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "log_sink_deliver", skip(self, item), fields(sink = %self.name, seq = item.seq))]
    async fn deliver(&mut self, item: &Item) -> Result<(), ContractError> {
        info!(
            sink = %self.name,
            addr = %self.endpoint.addr,
            key = %self.endpoint.key,
            seq = item.seq,
            bytes = item.len(),
            payload = %Self::preview(item),
            "Item delivered"
        );
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
