//! # Messaging Providers

mod in_memory;
mod rabbitmq;

pub use in_memory::InMemoryMessagingService;
pub use rabbitmq::RabbitMqMessagingService;
