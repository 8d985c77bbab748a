//! # Messaging Error Types
//!
//! Broker-level failures. Every variant except [`MessagingError::InvalidReceiptHandle`]
//! means the connection or channel can no longer be trusted, which is fatal
//! for the listener.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Broker connection error: {message}")]
    Connection { message: String },

    #[error("Queue declaration failed: {queue_name}: {message}")]
    QueueDeclare { queue_name: String, message: String },

    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Consumer error on {queue_name}: {message}")]
    Consume { queue_name: String, message: String },

    #[error("Publish failed: {queue_name}: {message}")]
    Publish { queue_name: String, message: String },

    #[error("Acknowledgment failed: {queue_name}: delivery {delivery_tag}: {message}")]
    Ack {
        queue_name: String,
        delivery_tag: u64,
        message: String,
    },

    #[error("Invalid receipt handle: {handle}")]
    InvalidReceiptHandle { handle: String },

    #[error("Delivery stream closed for queue: {queue_name}")]
    ConnectionClosed { queue_name: String },

    #[error("No consumer registered; call start_consuming first")]
    NotConsuming,
}

impl MessagingError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn queue_declare(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueueDeclare {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    pub fn queue_not_found(queue_name: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue_name: queue_name.into(),
        }
    }

    pub fn consume(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Consume {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    pub fn publish(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    pub fn ack(queue_name: impl Into<String>, delivery_tag: u64, message: impl Into<String>) -> Self {
        Self::Ack {
            queue_name: queue_name.into(),
            delivery_tag,
            message: message.into(),
        }
    }

    pub fn invalid_receipt_handle(handle: impl Into<String>) -> Self {
        Self::InvalidReceiptHandle {
            handle: handle.into(),
        }
    }

    pub fn connection_closed(queue_name: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            queue_name: queue_name.into(),
        }
    }

    /// Whether the broker connection should be considered lost
    pub fn is_connection_level(&self) -> bool {
        !matches!(self, Self::InvalidReceiptHandle { .. })
    }
}

pub type MessagingResult<T> = Result<T, MessagingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MessagingError::ack("alerts", 7, "channel closed");
        assert_eq!(
            err.to_string(),
            "Acknowledgment failed: alerts: delivery 7: channel closed"
        );

        let err = MessagingError::connection_closed("alerts");
        assert_eq!(err.to_string(), "Delivery stream closed for queue: alerts");
    }

    #[test]
    fn test_connection_level_classification() {
        assert!(MessagingError::connection("refused").is_connection_level());
        assert!(MessagingError::connection_closed("alerts").is_connection_level());
        assert!(!MessagingError::invalid_receipt_handle("abc").is_connection_level());
    }
}
