//! # Messaging Module
//!
//! Broker abstraction for the listener. The [`MessagingService`] trait is the
//! Connector's contract: declare the alert queue, hand out deliveries one at
//! a time, and acknowledge them.
//!
//! ```text
//! MessagingService (trait)
//!   ├── RabbitMqMessagingService   <- production, AMQP 0.9.1 via lapin
//!   └── InMemoryMessagingService   <- tests and local development
//! ```

pub mod errors;
pub mod providers;
pub mod traits;
pub mod types;

pub use errors::{MessagingError, MessagingResult};
pub use providers::{InMemoryMessagingService, RabbitMqMessagingService};
pub use traits::MessagingService;
pub use types::{QueuedMessage, ReceiptHandle};
