//! AMQP integration for the league service
//!
//! This module handles all AMQP connections, result submission consumption,
//! and outbound notification publishing for the league microservice.

pub mod connection;
pub mod handlers;
pub mod messages;
pub mod notifier;

// Re-export commonly used types
pub use connection::{AmqpConfig, AmqpConnection};
pub use handlers::MessageHandler;
pub use messages::*;
pub use notifier::{MockNotifier, Notifier, NotifierConfig};
