//! # Messaging Service Traits
//!
//! Provider-agnostic contract for the alert queue.

use async_trait::async_trait;

use super::types::{QueuedMessage, ReceiptHandle};
use super::MessagingError;

/// Connector contract: owns one broker connection and one consumer
///
/// The listener is strictly sequential, so delivery methods take `&mut self`
/// and a single owner drives the service. Implementations are expected to
/// release their connection in [`MessagingService::close`]; the consumer
/// loop calls it on every exit path.
#[async_trait]
pub trait MessagingService: Send + 'static {
    /// Create a queue if it doesn't exist (idempotent)
    ///
    /// If the queue already exists, it should succeed silently.
    async fn ensure_queue(&self, queue_name: &str) -> Result<(), MessagingError>;

    /// Publish a raw payload to a queue
    async fn send_message(&self, queue_name: &str, payload: &[u8]) -> Result<(), MessagingError>;

    /// Register as a consumer of `queue_name`
    ///
    /// Deliveries are then pulled with [`MessagingService::next_delivery`].
    async fn start_consuming(&mut self, queue_name: &str) -> Result<(), MessagingError>;

    /// Suspend until the next delivery arrives
    ///
    /// Returns `Ok(None)` when the delivery stream has ended, which means
    /// the broker connection or channel is gone.
    async fn next_delivery(&mut self) -> Result<Option<QueuedMessage>, MessagingError>;

    /// Acknowledge a delivery so the broker never redelivers it
    async fn ack_message(&self, receipt_handle: &ReceiptHandle) -> Result<(), MessagingError>;

    /// Verify the broker connection is still open
    async fn health_check(&self) -> Result<bool, MessagingError>;

    /// Close the consumer channel and connection
    ///
    /// Must be safe to call more than once.
    async fn close(&mut self) -> Result<(), MessagingError>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}
