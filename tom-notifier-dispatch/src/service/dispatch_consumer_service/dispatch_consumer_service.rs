use super::{DispatchJobPublisher, DispatchQueueConfig};
use crate::{
    dto::{protobuf::dispatch_job::DispatchJobProtobuf, DispatchJob},
    service::dispatch_job_service::{DispatchJobService, JobOutcome},
};
use amqprs::channel::{
    BasicConsumeArguments, ExchangeDeclareArguments, ExchangeType, QueueBindArguments,
    QueueDeclareArguments,
};
use anyhow::anyhow;
use async_trait::async_trait;
use prost::Message;
use rabbitmq_client::{
    consumer::RabbitmqConsumerDeliveryCallback, ConsumeError, RabbitmqConnection,
    RabbitmqConsumer, RabbitmqConsumerConfig,
};
use std::sync::Arc;

///
/// Consumes dispatch jobs from durable queue.
///
pub struct DispatchConsumerService {
    rabbitmq_consumer: RabbitmqConsumer,
}

impl DispatchConsumerService {
    pub async fn new(
        config: &DispatchQueueConfig,
        rabbitmq_connection: RabbitmqConnection,
        job_service: Arc<dyn DispatchJobService>,
        job_publisher: Arc<dyn DispatchJobPublisher>,
    ) -> anyhow::Result<Self> {
        let exchange_declare_args =
            ExchangeDeclareArguments::of_type(&config.exchange, ExchangeType::Direct)
                .durable(true)
                .finish();
        let queue_declare_args = QueueDeclareArguments::new(&config.queue)
            .durable(true)
            .finish();
        let queue_bind_args = vec![QueueBindArguments::new(
            &config.queue,
            &config.exchange,
            &config.routing_key,
        )];
        let basic_consume_args = BasicConsumeArguments::new(&config.queue, "")
            .manual_ack(true)
            .finish();

        let rabbitmq_consumer = RabbitmqConsumer::new(
            rabbitmq_connection,
            RabbitmqConsumerConfig {
                exchange_declare_args,
                queue_declare_args,
                queue_bind_args,
                basic_consume_args,
                prefetch_count: config.prefetch_count,
            },
            DispatchDeliveryCallback {
                job_service,
                job_publisher,
            },
        )
        .await?;

        Ok(Self { rabbitmq_consumer })
    }

    pub async fn close(self) {
        self.rabbitmq_consumer.close().await;
    }
}

struct DispatchDeliveryCallback {
    job_service: Arc<dyn DispatchJobService>,
    job_publisher: Arc<dyn DispatchJobPublisher>,
}

impl DispatchDeliveryCallback {
    fn decode(content: &[u8]) -> anyhow::Result<DispatchJob> {
        let message = DispatchJobProtobuf::decode(content)
            .map_err(|err| anyhow!("invalid dispatch job: {err}"))?;

        DispatchJob::try_from(message)
    }
}

#[async_trait]
impl RabbitmqConsumerDeliveryCallback for DispatchDeliveryCallback {
    #[tracing::instrument(name = "Dispatch Consumer", skip_all)]
    async fn execute(&self, content: Vec<u8>) -> Result<(), ConsumeError> {
        let job = match Self::decode(&content) {
            Ok(job) => job,
            Err(err) => {
                tracing::warn!(%err, "dropping undecodable job");
                return Err(ConsumeError { requeue: false });
            }
        };

        match self.job_service.run(&job).await {
            JobOutcome::Completed(_) | JobOutcome::Failed => Ok(()),
            JobOutcome::Retry {
                next_attempt,
                delay,
            } => {
                // delivery stays unacked until the delayed retry is published
                let retry = job.next_attempt(next_attempt);
                match self.job_publisher.publish(&retry, delay).await {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        tracing::error!(%err, "failed to publish retry");
                        Err(ConsumeError { requeue: true })
                    }
                }
            }
        }
    }
}
