//! MemorySink - records delivered items in memory

use std::sync::{Arc, Mutex, PoisonError};

use contracts::{ContractError, DeliverySink, Item};

/// Sink that keeps every delivered item; clones share the record.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    name: String,
    items: Arc<Mutex<Vec<Item>>>,
    closed: Arc<Mutex<bool>>,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Delivered items, in delivery order
    pub fn items(&self) -> Vec<Item> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Delivered payloads as text
    pub fn texts(&self) -> Vec<String> {
        self.items()
            .iter()
            .map(|item| item.text().into_owned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeliverySink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&mut self, item: &Item) -> Result<(), ContractError> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner) = true;
        Ok(())
    }
}
