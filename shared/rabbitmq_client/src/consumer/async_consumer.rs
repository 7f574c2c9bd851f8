use super::{ConsumeError, RabbitmqConsumerDeliveryCallback};
use amqprs::{
    channel::{BasicAckArguments, BasicNackArguments, Channel},
    AmqpDeliveryTag, BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::sync::Arc;

///
/// Moves every delivery into its own task and answers
/// with Ack/Nack once the callback finishes.
///
pub struct AsyncConsumer<DeliveryCallback> {
    channel: Channel,
    delivery_callback: Arc<DeliveryCallback>,
}

impl<DeliveryCallback> AsyncConsumer<DeliveryCallback> {
    pub fn new(channel: Channel, delivery_callback: Arc<DeliveryCallback>) -> Self {
        Self {
            channel,
            delivery_callback,
        }
    }
}

#[async_trait]
impl<DeliveryCallback> amqprs::consumer::AsyncConsumer for AsyncConsumer<DeliveryCallback>
where
    DeliveryCallback: RabbitmqConsumerDeliveryCallback + Send + Sync + 'static,
{
    async fn consume(
        &mut self,
        _channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        tracing::debug!(delivery_tag, "received delivery");

        let channel = self.channel.clone();
        let delivery_callback = Arc::clone(&self.delivery_callback);
        tokio::spawn(async move {
            let result = delivery_callback.execute(content).await;
            respond(&channel, delivery_tag, result).await;
        });
    }
}

async fn respond(
    channel: &Channel,
    delivery_tag: AmqpDeliveryTag,
    result: Result<(), ConsumeError>,
) {
    match result {
        Ok(()) => {
            let args = BasicAckArguments::new(delivery_tag, false);
            match channel.basic_ack(args).await {
                Ok(()) => tracing::trace!(delivery_tag, "ack sent"),
                Err(err) => tracing::warn!(delivery_tag, %err, "failed to send ack"),
            }
        }
        Err(ConsumeError { requeue }) => {
            let args = BasicNackArguments::new(delivery_tag, false, requeue);
            match channel.basic_nack(args).await {
                Ok(()) => tracing::trace!(delivery_tag, requeue, "nack sent"),
                Err(err) => tracing::warn!(delivery_tag, requeue, %err, "failed to send nack"),
            }
        }
    }
}
