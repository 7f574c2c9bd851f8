//!
//! Module with tools that allow to consume messages from RabbitMQ queues
//!

mod async_consumer;
mod channel_callback;
mod rabbitmq_consumer;

pub use rabbitmq_consumer::*;

use amqprs::channel::{
    BasicConsumeArguments, ExchangeDeclareArguments, QueueBindArguments, QueueDeclareArguments,
};
use async_trait::async_trait;

///
/// Callback executed whenever delivery is received.
///
/// Each delivery is processed in a separate tokio task,
/// so at most `prefetch_count` deliveries are processed at once.
/// Ok results in Ack, [ConsumeError] results in Nack.
///
#[async_trait]
pub trait RabbitmqConsumerDeliveryCallback {
    async fn execute(&self, content: Vec<u8>) -> Result<(), ConsumeError>;
}

#[derive(Debug, thiserror::Error)]
#[error("delivery rejected (requeue: {requeue})")]
pub struct ConsumeError {
    pub requeue: bool,
}

///
/// Topology declared by the consumer every time its channel is opened
///
#[derive(Clone)]
pub struct RabbitmqConsumerConfig {
    pub exchange_declare_args: ExchangeDeclareArguments,
    pub queue_declare_args: QueueDeclareArguments,
    pub queue_bind_args: Vec<QueueBindArguments>,
    pub basic_consume_args: BasicConsumeArguments,
    pub prefetch_count: u16,
}
