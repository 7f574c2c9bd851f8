use super::{
    async_consumer::AsyncConsumer, channel_callback::ChannelCallback,
    RabbitmqConsumerConfig, RabbitmqConsumerDeliveryCallback,
};
use crate::connection::RabbitmqConnection;
use amqprs::{
    channel::{BasicQosArguments, Channel},
    connection::Connection,
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{watch, Notify},
    task::JoinHandle,
};

///
/// Consumer that declares its topology and starts consuming
/// again whenever the connection is reopened or the server cancels it.
///
pub struct RabbitmqConsumer {
    task_handle: JoinHandle<()>,
    close_notify: Arc<Notify>,
}

impl RabbitmqConsumer {
    #[tracing::instrument(
        name = "RabbitMQ Consumer",
        target = "rabbitmq_client::consumer",
        skip_all
    )]
    pub async fn new<DeliveryCallback>(
        rabbitmq_connection: RabbitmqConnection,
        mut config: RabbitmqConsumerConfig,
        delivery_callback: DeliveryCallback,
    ) -> anyhow::Result<Self>
    where
        DeliveryCallback: RabbitmqConsumerDeliveryCallback + Send + Sync + 'static,
    {
        tracing::info!("starting consumer");

        // topology must be confirmed by the server before consuming
        config.exchange_declare_args.no_wait = false;
        config.queue_declare_args.no_wait(false);
        for queue_bind_args in config.queue_bind_args.iter_mut() {
            queue_bind_args.no_wait = false;
        }
        config.basic_consume_args.no_ack = false;
        config.basic_consume_args.no_wait = false;

        let mut connection_rx = rabbitmq_connection.connection();
        let Some(connection) = connection_rx.borrow_and_update().clone() else {
            anyhow::bail!("connection failed before creating consumer");
        };

        let delivery_callback = Arc::new(delivery_callback);
        let consumer_cancelled = Arc::new(Notify::new());
        let channel = start_consuming(
            &connection,
            &config,
            &delivery_callback,
            &consumer_cancelled,
        )
        .await?;

        let close_notify = Arc::new(Notify::new());
        let task = ConsumerTask {
            retry_interval: rabbitmq_connection.config().retry_interval,
            connection_rx,
            config,
            delivery_callback,
            consumer_cancelled,
        };
        let task_handle = tokio::spawn(task.run(channel, Arc::clone(&close_notify)));

        tracing::info!("consumer started");

        Ok(Self {
            task_handle,
            close_notify,
        })
    }

    pub async fn close(self) {
        tracing::info!("closing consumer");

        self.close_notify.notify_one();
        if let Err(err) = self.task_handle.await {
            tracing::error!(%err, "consumer task failed");
        }

        tracing::info!("consumer closed");
    }
}

async fn start_consuming<DeliveryCallback>(
    connection: &Connection,
    config: &RabbitmqConsumerConfig,
    delivery_callback: &Arc<DeliveryCallback>,
    consumer_cancelled: &Arc<Notify>,
) -> Result<Channel, amqprs::error::Error>
where
    DeliveryCallback: RabbitmqConsumerDeliveryCallback + Send + Sync + 'static,
{
    tracing::info!("opening channel");
    let channel = connection.open_channel(None).await?;
    channel
        .register_callback(ChannelCallback::new(Arc::clone(consumer_cancelled)))
        .await?;

    channel
        .basic_qos(BasicQosArguments::new(0, config.prefetch_count, false))
        .await?;

    tracing::info!("declaring topology");
    channel
        .exchange_declare(config.exchange_declare_args.clone())
        .await?;
    channel
        .queue_declare(config.queue_declare_args.clone())
        .await?;
    for queue_bind_args in config.queue_bind_args.iter() {
        channel.queue_bind(queue_bind_args.clone()).await?;
    }

    tracing::info!("consuming");
    let consumer = AsyncConsumer::new(channel.clone(), Arc::clone(delivery_callback));
    channel
        .basic_consume(consumer, config.basic_consume_args.clone())
        .await?;

    Ok(channel)
}

struct ConsumerTask<DeliveryCallback> {
    retry_interval: Duration,
    connection_rx: watch::Receiver<Option<Connection>>,
    config: RabbitmqConsumerConfig,
    delivery_callback: Arc<DeliveryCallback>,
    consumer_cancelled: Arc<Notify>,
}

impl<DeliveryCallback> ConsumerTask<DeliveryCallback>
where
    DeliveryCallback: RabbitmqConsumerDeliveryCallback + Send + Sync + 'static,
{
    #[tracing::instrument(
        name = "RabbitMQ Consumer",
        target = "rabbitmq_client::consumer",
        skip_all
    )]
    async fn run(mut self, mut channel: Channel, close_notify: Arc<Notify>) {
        loop {
            tokio::select! {
                biased;

                _ = close_notify.notified() => break,
                changed = self.connection_rx.changed() => {
                    if changed.is_err() {
                        tracing::warn!("connection dropped");
                        break;
                    }
                    if self.connection_rx.borrow().is_none() {
                        tracing::warn!("connection broken, waiting for reconnect");
                        continue;
                    }
                }
                _ = self.consumer_cancelled.notified() => {
                    tracing::warn!("consumer cancelled, restoring");
                }
            }

            tokio::select! {
                biased;

                _ = close_notify.notified() => return,
                restored = self.restore() => channel = restored,
            }
        }

        tracing::info!("closing channel");
        if let Err(err) = channel.close().await {
            tracing::warn!(%err, "closing channel failed");
        }
    }

    async fn restore(&mut self) -> Channel {
        loop {
            let connection = self.connection_rx.borrow_and_update().clone();
            let Some(connection) = connection else {
                if self.connection_rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
                continue;
            };

            match start_consuming(
                &connection,
                &self.config,
                &self.delivery_callback,
                &self.consumer_cancelled,
            )
            .await
            {
                Ok(channel) => {
                    tracing::info!("consumer restored");
                    return channel;
                }
                Err(err) => {
                    tracing::warn!(%err, "failed to restore consumer");
                    tokio::time::sleep(self.retry_interval).await;
                }
            }
        }
    }
}
