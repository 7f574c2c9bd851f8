use super::DispatchQueueConfig;
use crate::dto::{protobuf::dispatch_job::DispatchJobProtobuf, DispatchJob};
use amqprs::{
    channel::{ExchangeDeclareArguments, ExchangeType, QueueBindArguments, QueueDeclareArguments},
    BasicProperties, FieldTable, FieldValue, LongStr,
};
use anyhow::anyhow;
use async_trait::async_trait;
use prost::Message;
use rabbitmq_client::{PublishError, RabbitmqConnection, RabbitmqProducer};
use std::time::Duration;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DispatchJobPublisher: Send + Sync {
    ///
    /// Publishes job that reaches the dispatch queue again after `delay`.
    /// Delay is rounded up to the nearest retry queue, the longest queue is used above it.
    ///
    async fn publish(&self, job: &DispatchJob, delay: Duration) -> Result<(), PublishError>;
}

#[derive(Debug, Clone, PartialEq)]
struct RetryQueue {
    delay: Duration,
    name: String,
}

///
/// Queues without consumers holding jobs for their delay,
/// expired jobs are dead lettered back to the dispatch exchange.
///
#[derive(Debug, Clone, PartialEq)]
struct RetryQueues {
    /// Ascending
    shorter: Vec<RetryQueue>,
    longest: RetryQueue,
}

impl RetryQueues {
    fn new(queue: &str, delays: &[Duration]) -> anyhow::Result<Self> {
        let mut delays = delays.to_vec();
        delays.sort();
        delays.dedup();

        let mut queues = delays
            .into_iter()
            .map(|delay| RetryQueue {
                delay,
                name: format!("{queue}.retry.{}ms", delay.as_millis()),
            })
            .collect::<Vec<_>>();
        let longest = queues
            .pop()
            .ok_or_else(|| anyhow!("at least one retry delay required"))?;

        Ok(Self {
            shorter: queues,
            longest,
        })
    }

    fn for_delay(&self, delay: Duration) -> &RetryQueue {
        self.shorter
            .iter()
            .find(|queue| queue.delay >= delay)
            .unwrap_or(&self.longest)
    }

    fn iter(&self) -> impl Iterator<Item = &RetryQueue> {
        self.shorter.iter().chain(std::iter::once(&self.longest))
    }
}

fn retry_exchange(config: &DispatchQueueConfig) -> String {
    format!("{}.retry", config.exchange)
}

fn retry_queue_declare_args(
    config: &DispatchQueueConfig,
    queue: &RetryQueue,
) -> anyhow::Result<QueueDeclareArguments> {
    let dead_letter_exchange = LongStr::try_from(config.exchange.clone())
        .map_err(|err| anyhow!("invalid exchange name: {err:?}"))?;
    let dead_letter_routing_key = LongStr::try_from(config.routing_key.clone())
        .map_err(|err| anyhow!("invalid routing key: {err:?}"))?;

    let mut arguments = FieldTable::new();
    arguments.insert(
        "x-message-ttl".try_into().map_err(|err| anyhow!("{err:?}"))?,
        FieldValue::l(queue.delay.as_millis() as i64),
    );
    arguments.insert(
        "x-dead-letter-exchange".try_into().map_err(|err| anyhow!("{err:?}"))?,
        FieldValue::S(dead_letter_exchange),
    );
    arguments.insert(
        "x-dead-letter-routing-key".try_into().map_err(|err| anyhow!("{err:?}"))?,
        FieldValue::S(dead_letter_routing_key),
    );

    let args = QueueDeclareArguments::new(&queue.name)
        .durable(true)
        .arguments(arguments)
        .finish();

    Ok(args)
}

///
/// Publishes retried jobs to delay queues routed back to the dispatch exchange.
///
pub struct RabbitmqDispatchJobPublisher {
    retry_queues: RetryQueues,
    producer: RabbitmqProducer,
}

impl RabbitmqDispatchJobPublisher {
    pub async fn new(
        config: &DispatchQueueConfig,
        rabbitmq_connection: RabbitmqConnection,
        retry_delays: &[Duration],
    ) -> anyhow::Result<Self> {
        let retry_queues = RetryQueues::new(&config.queue, retry_delays)?;
        let retry_exchange_declare_args =
            ExchangeDeclareArguments::of_type(&retry_exchange(config), ExchangeType::Direct)
                .durable(true)
                .finish();

        Self::declare_retry_queues(
            config,
            &rabbitmq_connection,
            &retry_exchange_declare_args,
            &retry_queues,
        )
        .await?;

        let producer =
            RabbitmqProducer::new(rabbitmq_connection, retry_exchange_declare_args).await?;

        Ok(Self {
            retry_queues,
            producer,
        })
    }

    pub async fn close(self) {
        self.producer.close().await;
    }

    async fn declare_retry_queues(
        config: &DispatchQueueConfig,
        rabbitmq_connection: &RabbitmqConnection,
        retry_exchange_declare_args: &ExchangeDeclareArguments,
        retry_queues: &RetryQueues,
    ) -> anyhow::Result<()> {
        let connection = rabbitmq_connection
            .connection()
            .borrow()
            .clone()
            .ok_or_else(|| anyhow!("connection failed before declaring retry queues"))?;
        let channel = connection.open_channel(None).await?;

        // dead lettered jobs are dropped when the dispatch exchange is missing
        let dispatch_exchange_declare_args =
            ExchangeDeclareArguments::of_type(&config.exchange, ExchangeType::Direct)
                .durable(true)
                .finish();
        channel.exchange_declare(dispatch_exchange_declare_args).await?;
        channel
            .exchange_declare(retry_exchange_declare_args.clone())
            .await?;

        for queue in retry_queues.iter() {
            channel
                .queue_declare(retry_queue_declare_args(config, queue)?)
                .await?;
            channel
                .queue_bind(QueueBindArguments::new(
                    &queue.name,
                    &retry_exchange_declare_args.exchange,
                    &queue.name,
                ))
                .await?;
            tracing::info!(queue = %queue.name, delay = ?queue.delay, "retry queue declared");
        }

        channel.close().await?;

        Ok(())
    }
}

#[async_trait]
impl DispatchJobPublisher for RabbitmqDispatchJobPublisher {
    async fn publish(&self, job: &DispatchJob, delay: Duration) -> Result<(), PublishError> {
        let retry_queue = self.retry_queues.for_delay(delay);
        tracing::info!(
            attempt = job.attempt,
            ?delay,
            queue = %retry_queue.name,
            "publishing dispatch job"
        );

        let message = DispatchJobProtobuf::from(job);
        let basic_properties = BasicProperties::default()
            .with_persistence(true)
            .with_content_type("application/x-protobuf")
            .finish();

        self.producer
            .publish(&retry_queue.name, basic_properties, message.encode_to_vec())
            .await
    }
}
