//!
//! Module with tools that allow to publish messages to RabbitMQ exchanges
//!

mod rabbitmq_producer;

pub use rabbitmq_producer::{PublishError, RabbitmqProducer};
