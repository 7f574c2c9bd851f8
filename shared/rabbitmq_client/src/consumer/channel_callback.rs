use amqprs::{
    callbacks::ChannelCallback as AmqpChannelCallback, channel::Channel, Ack, BasicProperties,
    Cancel, CloseChannel, Nack, Return,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;

///
/// Signals that server cancelled the consumer (e.g. queue was deleted)
/// so consumer task can declare topology again.
///
pub struct ChannelCallback {
    consumer_cancelled: Arc<Notify>,
}

impl ChannelCallback {
    pub fn new(consumer_cancelled: Arc<Notify>) -> Self {
        Self { consumer_cancelled }
    }
}

#[async_trait]
impl AmqpChannelCallback for ChannelCallback {
    async fn close(
        &mut self,
        _channel: &Channel,
        close: CloseChannel,
    ) -> Result<(), amqprs::error::Error> {
        tracing::error!(
            code = close.reply_code(),
            text = close.reply_text(),
            "consumer channel closed by server",
        );

        Ok(())
    }

    async fn cancel(
        &mut self,
        _channel: &Channel,
        _cancel: Cancel,
    ) -> Result<(), amqprs::error::Error> {
        tracing::error!("consumer cancelled by server");

        self.consumer_cancelled.notify_one();

        Ok(())
    }

    async fn flow(
        &mut self,
        _channel: &Channel,
        active: bool,
    ) -> Result<bool, amqprs::error::Error> {
        Ok(active)
    }

    async fn publish_ack(&mut self, _channel: &Channel, _ack: Ack) {}

    async fn publish_nack(&mut self, _channel: &Channel, _nack: Nack) {}

    async fn publish_return(
        &mut self,
        _channel: &Channel,
        _ret: Return,
        _basic_properties: BasicProperties,
        _content: Vec<u8>,
    ) {
    }
}
