//! # Messaging Types
//!
//! Provider-neutral delivery types.

use chrono::{DateTime, Utc};

/// Opaque handle used to acknowledge a delivery
///
/// For RabbitMQ this is the channel's delivery tag rendered as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(pub String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the handle back into an AMQP delivery tag
    pub fn as_delivery_tag(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ReceiptHandle {
    fn from(tag: u64) -> Self {
        Self(tag.to_string())
    }
}

impl From<&str> for ReceiptHandle {
    fn from(handle: &str) -> Self {
        Self(handle.to_string())
    }
}

/// A single delivery from the alert queue
///
/// The payload is raw bytes: the wire contract is one text-encoded service
/// identifier per message, with no envelope. Decoding happens in the
/// dispatcher, not here.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    /// Handle for acknowledging this delivery
    pub receipt_handle: ReceiptHandle,

    /// Message body as delivered
    pub payload: Vec<u8>,

    /// Broker flagged this as a redelivery
    pub redelivered: bool,

    pub received_at: DateTime<Utc>,
}

impl QueuedMessage {
    pub fn new(receipt_handle: ReceiptHandle, payload: Vec<u8>, redelivered: bool) -> Self {
        Self {
            receipt_handle,
            payload,
            redelivered,
            received_at: Utc::now(),
        }
    }
}
