//!
//! Module that allows to establish connection with RabbitMQ server.
//!

mod connection_callback;
mod rabbitmq_connection;

use std::time::Duration;

pub use rabbitmq_connection::RabbitmqConnection;

#[derive(Debug, Clone)]
pub struct RabbitmqConnectionConfig {
    /// Delay between attempts to reopen broken connection
    pub retry_interval: Duration,
}
