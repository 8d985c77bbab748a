//! # In-Memory Messaging Service
//!
//! FIFO queue implementation for testing and local development.
//!
//! ## Features
//!
//! - **Broker-like acks**: acknowledging an unknown or already-acked delivery
//!   fails, the way RabbitMQ closes a channel on a double ack
//! - **Finite stream**: once the consumed queue is drained, `next_delivery`
//!   returns `None`, which the listener treats as a lost connection
//! - **Inspection**: acknowledged handles and close calls are recorded and
//!   visible through any [`InMemoryMessagingService::handle`]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::messaging::traits::MessagingService;
use crate::messaging::types::{QueuedMessage, ReceiptHandle};
use crate::messaging::MessagingError;

#[derive(Debug, Clone)]
struct InMemoryMessage {
    payload: Vec<u8>,
    redelivered: bool,
}

/// Queue state shared by every handle of a service
#[derive(Debug, Default)]
struct InMemoryState {
    queues: Mutex<HashMap<String, VecDeque<InMemoryMessage>>>,
    next_tag: AtomicU64,
    unacked: Mutex<HashSet<u64>>,
    acknowledged: Mutex<Vec<ReceiptHandle>>,
    fail_acks: AtomicBool,
    close_calls: AtomicU64,
}

/// In-memory messaging service
///
/// # Example
///
/// ```rust
/// use runbook_listener::messaging::{InMemoryMessagingService, MessagingService};
///
/// # tokio_test::block_on(async {
/// let mut service = InMemoryMessagingService::with_queues(&["alerts"]);
/// service.send_message("alerts", b"payment-service").await?;
///
/// service.start_consuming("alerts").await?;
/// let delivery = service.next_delivery().await?.expect("one message queued");
/// service.ack_message(&delivery.receipt_handle).await?;
///
/// assert_eq!(service.acknowledged().len(), 1);
/// assert_eq!(service.unacknowledged_count(), 0);
/// # Ok::<(), runbook_listener::messaging::MessagingError>(())
/// # }).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct InMemoryMessagingService {
    state: Arc<InMemoryState>,
    consuming: Option<String>,
}

impl InMemoryMessagingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-declared queues
    pub fn with_queues(queue_names: &[&str]) -> Self {
        let service = Self::new();
        {
            let mut queues = service.state.queues.lock();
            for name in queue_names {
                queues.insert((*name).to_string(), VecDeque::new());
            }
        }
        service
    }

    /// A second handle onto the same queues, with no consumer registered
    ///
    /// Lets a test inspect acknowledgments while the consumer owns the
    /// service itself.
    pub fn handle(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            consuming: None,
        }
    }

    /// Enqueue a payload flagged as a redelivery
    pub fn push_redelivery(&self, queue_name: &str, payload: &[u8]) -> Result<(), MessagingError> {
        self.push(queue_name, payload, true)
    }

    /// Make every subsequent ack fail, as if the channel had been closed
    pub fn fail_acks(&self, fail: bool) {
        self.state.fail_acks.store(fail, Ordering::SeqCst);
    }

    /// Handles acknowledged so far, in ack order
    pub fn acknowledged(&self) -> Vec<ReceiptHandle> {
        self.state.acknowledged.lock().clone()
    }

    /// Deliveries handed out but not yet acknowledged
    pub fn unacknowledged_count(&self) -> usize {
        self.state.unacked.lock().len()
    }

    pub fn queue_length(&self, queue_name: &str) -> usize {
        self.state
            .queues
            .lock()
            .get(queue_name)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    pub fn close_calls(&self) -> u64 {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    fn push(&self, queue_name: &str, payload: &[u8], redelivered: bool) -> Result<(), MessagingError> {
        let mut queues = self.state.queues.lock();
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;
        queue.push_back(InMemoryMessage {
            payload: payload.to_vec(),
            redelivered,
        });
        Ok(())
    }
}

#[async_trait]
impl MessagingService for InMemoryMessagingService {
    async fn ensure_queue(&self, queue_name: &str) -> Result<(), MessagingError> {
        self.state
            .queues
            .lock()
            .entry(queue_name.to_string())
            .or_default();
        Ok(())
    }

    async fn send_message(&self, queue_name: &str, payload: &[u8]) -> Result<(), MessagingError> {
        self.push(queue_name, payload, false)
    }

    async fn start_consuming(&mut self, queue_name: &str) -> Result<(), MessagingError> {
        if !self.state.queues.lock().contains_key(queue_name) {
            return Err(MessagingError::queue_not_found(queue_name));
        }
        self.consuming = Some(queue_name.to_string());
        Ok(())
    }

    async fn next_delivery(&mut self) -> Result<Option<QueuedMessage>, MessagingError> {
        let queue_name = self.consuming.as_deref().ok_or(MessagingError::NotConsuming)?;

        let message = self
            .state
            .queues
            .lock()
            .get_mut(queue_name)
            .and_then(VecDeque::pop_front);

        Ok(message.map(|message| {
            let tag = self.state.next_tag.fetch_add(1, Ordering::SeqCst) + 1;
            self.state.unacked.lock().insert(tag);
            QueuedMessage::new(ReceiptHandle::from(tag), message.payload, message.redelivered)
        }))
    }

    async fn ack_message(&self, receipt_handle: &ReceiptHandle) -> Result<(), MessagingError> {
        let queue_name = self.consuming.clone().unwrap_or_default();
        let tag = receipt_handle
            .as_delivery_tag()
            .ok_or_else(|| MessagingError::invalid_receipt_handle(receipt_handle.as_str()))?;

        if self.state.fail_acks.load(Ordering::SeqCst) {
            return Err(MessagingError::ack(queue_name, tag, "channel closed"));
        }

        if !self.state.unacked.lock().remove(&tag) {
            return Err(MessagingError::ack(queue_name, tag, "unknown delivery tag"));
        }

        self.state.acknowledged.lock().push(receipt_handle.clone());
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, MessagingError> {
        Ok(true)
    }

    async fn close(&mut self) -> Result<(), MessagingError> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        self.consuming = None;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
