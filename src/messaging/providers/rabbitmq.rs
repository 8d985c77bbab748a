//! # RabbitMQ Messaging Service
//!
//! RabbitMQ implementation of the `MessagingService` trait using the `lapin` crate.
//!
//! ## Behavior
//!
//! - **Idempotent declare**: the alert queue is declared on connect, so
//!   repeated startups against an existing queue are safe
//! - **Push consumer**: deliveries arrive through `basic_consume`; the
//!   listener awaits them one at a time
//! - **Prefetch**: defaults to 1 so the broker never hands us a second alert
//!   while a remediation is still running
//! - **No reconnect**: a dropped connection ends the delivery stream and the
//!   process exits for its supervisor to restart
//!
//! ## Usage
//!
//! ```ignore
//! use runbook_listener::config::BrokerEndpoint;
//! use runbook_listener::messaging::{MessagingService, RabbitMqMessagingService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = BrokerEndpoint::default();
//! let mut service = RabbitMqMessagingService::connect(&endpoint).await?;
//!
//! service.start_consuming(&endpoint.queue).await?;
//! while let Some(delivery) = service.next_delivery().await? {
//!     service.ack_message(&delivery.receipt_handle).await?;
//! }
//! service.close().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use tracing::{debug, info, warn};

use crate::config::BrokerEndpoint;
use crate::messaging::traits::MessagingService;
use crate::messaging::types::{QueuedMessage, ReceiptHandle};
use crate::messaging::MessagingError;

const CONNECTION_NAME: &str = "runbook-listener";

/// AMQP reply code for a normal shutdown
const REPLY_SUCCESS: u16 = 200;

/// RabbitMQ-based messaging service implementation
pub struct RabbitMqMessagingService {
    connection: Connection,
    channel: Channel,
    endpoint: BrokerEndpoint,
    consumer: Option<Consumer>,
    consuming_queue: Option<String>,
    closed: bool,
}

impl std::fmt::Debug for RabbitMqMessagingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RabbitMqMessagingService")
            .field("uri", &self.endpoint.redacted_uri())
            .field("queue", &self.endpoint.queue)
            .field("consuming_queue", &self.consuming_queue)
            .field("closed", &self.closed)
            .finish()
    }
}

impl RabbitMqMessagingService {
    /// Connect to the broker and declare the configured queue
    ///
    /// Any failure here is a connection error; there is no retry.
    pub async fn connect(endpoint: &BrokerEndpoint) -> Result<Self, MessagingError> {
        let connection = Connection::connect(
            &endpoint.amqp_uri(),
            ConnectionProperties::default().with_connection_name(CONNECTION_NAME.into()),
        )
        .await
        .map_err(|e| {
            MessagingError::connection(format!(
                "RabbitMQ connection to {} failed: {}",
                endpoint.redacted_uri(),
                e
            ))
        })?;

        let channel = connection.create_channel().await.map_err(|e| {
            MessagingError::connection(format!("RabbitMQ channel creation failed: {}", e))
        })?;

        channel
            .basic_qos(endpoint.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| MessagingError::connection(format!("Failed to set QoS: {}", e)))?;

        let service = Self {
            connection,
            channel,
            endpoint: endpoint.clone(),
            consumer: None,
            consuming_queue: None,
            closed: false,
        };

        service.ensure_queue(&endpoint.queue).await?;

        info!(
            uri = %endpoint.redacted_uri(),
            queue = %endpoint.queue,
            prefetch = endpoint.prefetch_count,
            "Connected to RabbitMQ"
        );

        Ok(service)
    }

    fn queue_label(&self) -> &str {
        self.consuming_queue
            .as_deref()
            .unwrap_or(self.endpoint.queue.as_str())
    }
}

#[async_trait]
impl MessagingService for RabbitMqMessagingService {
    async fn ensure_queue(&self, queue_name: &str) -> Result<(), MessagingError> {
        let queue = self
            .channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: self.endpoint.durable,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::queue_declare(queue_name, e.to_string()))?;

        debug!(
            queue = %queue_name,
            messages = queue.message_count(),
            consumers = queue.consumer_count(),
            "Queue declared"
        );

        Ok(())
    }

    async fn send_message(&self, queue_name: &str, payload: &[u8]) -> Result<(), MessagingError> {
        let confirm = self
            .channel
            .basic_publish(
                "",         // Default exchange
                queue_name, // Routing key = queue name
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_content_type("text/plain".into()),
            )
            .await
            .map_err(|e| MessagingError::publish(queue_name, e.to_string()))?;

        confirm
            .await
            .map_err(|e| MessagingError::publish(queue_name, format!("confirmation failed: {}", e)))?;

        Ok(())
    }

    async fn start_consuming(&mut self, queue_name: &str) -> Result<(), MessagingError> {
        let consumer_tag = format!("{}-{}", CONNECTION_NAME, uuid::Uuid::new_v4());

        let consumer = self
            .channel
            .basic_consume(
                queue_name,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::consume(queue_name, e.to_string()))?;

        debug!(queue = %queue_name, consumer_tag = %consumer_tag, "Consumer registered");

        self.consumer = Some(consumer);
        self.consuming_queue = Some(queue_name.to_string());
        Ok(())
    }

    async fn next_delivery(&mut self) -> Result<Option<QueuedMessage>, MessagingError> {
        let queue_name = self.queue_label().to_string();
        let consumer = self.consumer.as_mut().ok_or(MessagingError::NotConsuming)?;

        match consumer.next().await {
            Some(Ok(delivery)) => Ok(Some(QueuedMessage::new(
                ReceiptHandle::from(delivery.delivery_tag),
                delivery.data,
                delivery.redelivered,
            ))),
            Some(Err(e)) => Err(MessagingError::consume(queue_name, e.to_string())),
            None => Ok(None),
        }
    }

    async fn ack_message(&self, receipt_handle: &ReceiptHandle) -> Result<(), MessagingError> {
        let delivery_tag = receipt_handle
            .as_delivery_tag()
            .ok_or_else(|| MessagingError::invalid_receipt_handle(receipt_handle.as_str()))?;

        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| MessagingError::ack(self.queue_label(), delivery_tag, e.to_string()))
    }

    async fn health_check(&self) -> Result<bool, MessagingError> {
        if self.connection.status().connected() {
            Ok(true)
        } else {
            Err(MessagingError::connection("RabbitMQ connection is not connected"))
        }
    }

    async fn close(&mut self) -> Result<(), MessagingError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.consumer = None;

        if let Err(e) = self.channel.close(REPLY_SUCCESS, "listener shutdown").await {
            // Channel may already be gone with the connection; keep closing
            warn!(error = %e, "RabbitMQ channel close failed");
        }

        if !self.connection.status().connected() {
            return Ok(());
        }

        self.connection
            .close(REPLY_SUCCESS, "listener shutdown")
            .await
            .map_err(|e| MessagingError::connection(format!("RabbitMQ close failed: {}", e)))?;

        info!(queue = %self.queue_label(), "RabbitMQ connection closed");
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "rabbitmq"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Integration tests require RabbitMQ to be running
    // Run with: docker run -d -p 5672:5672 rabbitmq:3
    // Then: cargo test rabbitmq -- --ignored

    fn test_endpoint(queue: &str) -> BrokerEndpoint {
        BrokerEndpoint {
            host: std::env::var("RABBITMQ_HOST").unwrap_or_else(|_| "localhost".to_string()),
            queue: queue.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_connection_error() {
        let endpoint = BrokerEndpoint {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..Default::default()
        };

        let result = RabbitMqMessagingService::connect(&endpoint).await;
        assert!(matches!(result, Err(MessagingError::Connection { .. })));
    }

    #[tokio::test]
    #[ignore = "requires RabbitMQ running"]
    async fn test_rabbitmq_declare_is_idempotent() {
        let queue = format!("test_declare_{}", uuid::Uuid::new_v4());
        let mut service = RabbitMqMessagingService::connect(&test_endpoint(&queue))
            .await
            .unwrap();

        assert_eq!(service.provider_name(), "rabbitmq");
        assert!(service.ensure_queue(&queue).await.is_ok());
        assert!(service.ensure_queue(&queue).await.is_ok());
        assert!(service.health_check().await.unwrap());

        service.close().await.unwrap();
        service.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires RabbitMQ running"]
    async fn test_rabbitmq_consume_and_ack() {
        let queue = format!("test_consume_{}", uuid::Uuid::new_v4());
        let mut service = RabbitMqMessagingService::connect(&test_endpoint(&queue))
            .await
            .unwrap();

        service
            .send_message(&queue, b"inventory-service")
            .await
            .unwrap();
        service.start_consuming(&queue).await.unwrap();

        let delivery = service.next_delivery().await.unwrap().unwrap();
        assert_eq!(delivery.payload, b"inventory-service");
        assert!(!delivery.redelivered);

        service.ack_message(&delivery.receipt_handle).await.unwrap();
        service.close().await.unwrap();
    }
}
