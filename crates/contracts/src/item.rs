//! Item - the unit moved from the source queue to every sink

use std::borrow::Cow;

use bytes::Bytes;

/// An opaque payload popped from the source queue.
///
/// Cloning is cheap: the payload is reference counted, so broadcasting
/// to N sinks does not copy the bytes N times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Position in the source's dequeue order (assigned by the source consumer)
    pub seq: u64,

    /// Queue key the item was popped from
    pub key: String,

    /// Raw payload
    pub payload: Bytes,
}

impl Item {
    /// Create an item with sequence number 0
    pub fn new(key: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            seq: 0,
            key: key.into(),
            payload: payload.into(),
        }
    }

    /// Set the sequence number
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    /// Payload as text, replacing invalid UTF-8
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
