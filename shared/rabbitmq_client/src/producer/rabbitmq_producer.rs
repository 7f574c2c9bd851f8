use crate::connection::RabbitmqConnection;
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    connection::Connection,
    BasicProperties,
};
use tokio::sync::{watch, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("connection is not available")]
    ConnectionUnavailable,

    #[error("connection is blocked by the server")]
    ConnectionBlocked,

    #[error("amqp error: {0}")]
    Amqp(#[from] amqprs::error::Error),
}

///
/// Producer publishing to a single exchange.
///
/// Channel is opened lazily and reopened after the connection
/// is recreated, publishing fails fast while the connection is down.
///
pub struct RabbitmqProducer {
    exchange_declare_args: ExchangeDeclareArguments,

    connection_rx: watch::Receiver<Option<Connection>>,
    blocked_rx: watch::Receiver<bool>,

    channel: Mutex<Option<Channel>>,
}

impl RabbitmqProducer {
    #[tracing::instrument(
        name = "RabbitMQ Producer",
        target = "rabbitmq_client::producer",
        skip_all
    )]
    pub async fn new(
        rabbitmq_connection: RabbitmqConnection,
        mut exchange_declare_args: ExchangeDeclareArguments,
    ) -> anyhow::Result<Self> {
        tracing::info!("starting producer");

        exchange_declare_args.no_wait = false;

        let producer = Self {
            exchange_declare_args,
            connection_rx: rabbitmq_connection.connection(),
            blocked_rx: rabbitmq_connection.connection_blocked(),
            channel: Mutex::new(None),
        };

        let channel = producer.open_channel().await?;
        *producer.channel.lock().await = Some(channel);

        tracing::info!("producer started");

        Ok(producer)
    }

    #[tracing::instrument(
        name = "RabbitMQ Producer",
        target = "rabbitmq_client::producer",
        skip_all
    )]
    pub async fn close(self) {
        tracing::info!("closing producer");

        if let Some(channel) = self.channel.into_inner() {
            if let Err(err) = channel.close().await {
                tracing::warn!(%err, "closing channel failed");
            }
        }

        tracing::info!("producer closed");
    }

    pub fn exchange(&self) -> &str {
        &self.exchange_declare_args.exchange
    }

    #[tracing::instrument(
        name = "RabbitMQ Producer",
        target = "rabbitmq_client::producer",
        skip(self, basic_properties, content)
    )]
    pub async fn publish(
        &self,
        routing_key: &str,
        basic_properties: BasicProperties,
        content: Vec<u8>,
    ) -> Result<(), PublishError> {
        if *self.blocked_rx.borrow() {
            return Err(PublishError::ConnectionBlocked);
        }

        let mut channel = self.channel.lock().await;
        let open_channel = match channel.take() {
            Some(current) if current.is_open() => current,
            _ => {
                tracing::info!("reopening channel");
                self.open_channel().await?
            }
        };

        let args = BasicPublishArguments::new(self.exchange(), routing_key);
        let result = open_channel
            .basic_publish(basic_properties, content, args)
            .await;
        *channel = Some(open_channel);

        result?;
        tracing::trace!("message published");

        Ok(())
    }

    async fn open_channel(&self) -> Result<Channel, PublishError> {
        let connection = self
            .connection_rx
            .borrow()
            .clone()
            .ok_or(PublishError::ConnectionUnavailable)?;

        let channel = connection.open_channel(None).await?;
        channel
            .exchange_declare(self.exchange_declare_args.clone())
            .await?;

        Ok(channel)
    }
}
