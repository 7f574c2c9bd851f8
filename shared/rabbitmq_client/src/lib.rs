//!
//! RabbitMQ building blocks shared by tom-notifier services.
//!
//! [connection::RabbitmqConnection] keeps a single AMQP connection alive,
//! [consumer::RabbitmqConsumer] and [producer::RabbitmqProducer] recover
//! their channels whenever the connection is recreated.
//!

pub mod connection;
pub mod consumer;
pub mod producer;

mod retry;

pub use connection::{RabbitmqConnection, RabbitmqConnectionConfig};
pub use consumer::{ConsumeError, RabbitmqConsumer, RabbitmqConsumerConfig};
pub use producer::{PublishError, RabbitmqProducer};
