use super::{
    bounded_target_identifier, entity::DeliveryAttemptInsertEntity, target_hash,
    DeliveryAttemptsRepository, NewDeliveryAttempt,
};
use crate::{
    dto::{DeliveryChannel, DeliveryStatus},
    repository::{self, Error},
};
use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::{options::IndexOptions, Database, IndexModel};
use uuid::Uuid;

const DELIVERY_ATTEMPTS: &str = "delivery_attempts";
const INDEX_NAME_DISPATCH_CHANNEL_TARGET_HASH: &str = "index_dispatch_channel_target_hash";

pub struct DeliveryAttemptsRepositoryImpl {
    database: Database,
}

impl DeliveryAttemptsRepositoryImpl {
    pub async fn new(database: Database) -> Result<Self, mongodb::error::Error> {
        tracing::debug!(collection = DELIVERY_ATTEMPTS, "creating collection");
        repository::ensure_collection(&database, DELIVERY_ATTEMPTS).await?;

        let collection = database.collection::<Document>(DELIVERY_ATTEMPTS);

        tracing::debug!("fetching index names");
        let index_names = collection.list_index_names().await?;

        if !index_names.contains(&INDEX_NAME_DISPATCH_CHANNEL_TARGET_HASH.to_string()) {
            collection
                .create_index(
                    IndexModel::builder()
                        .keys(doc! {
                            "dispatch_id": 1,
                            "channel": 1,
                            "target_hash": 1,
                        })
                        .options(
                            IndexOptions::builder()
                                .name(INDEX_NAME_DISPATCH_CHANNEL_TARGET_HASH.to_string())
                                .build(),
                        )
                        .build(),
                )
                .await?;
            tracing::debug!(
                collection = DELIVERY_ATTEMPTS,
                index = INDEX_NAME_DISPATCH_CHANNEL_TARGET_HASH,
                "created index"
            );
        }

        Ok(Self { database })
    }
}

#[async_trait]
impl DeliveryAttemptsRepository for DeliveryAttemptsRepositoryImpl {
    async fn insert(&self, attempt: NewDeliveryAttempt) -> Result<ObjectId, repository::Error> {
        let payload =
            bson::to_document(&attempt.payload).map_err(|err| Error::Mongo(err.into()))?;
        let error_message = match attempt.status {
            DeliveryStatus::Failed => Some(
                attempt
                    .error_message
                    .filter(|message| !message.is_empty())
                    .unwrap_or_else(|| "unknown error".to_string()),
            ),
            DeliveryStatus::Sent => attempt.error_message,
        };

        let insert_entity = DeliveryAttemptInsertEntity {
            dispatch_id: attempt.dispatch_id.into(),
            recipient_id: attempt.recipient_id,
            channel: attempt.channel.to_string(),
            target_identifier: bounded_target_identifier(&attempt.target_identifier),
            target_hash: target_hash(&attempt.target_identifier),
            title: attempt.title,
            body: attempt.body,
            payload,
            status: attempt.status.to_string(),
            failure_kind: attempt.failure_kind.map(|kind| kind.to_string()),
            response_summary: attempt.response_summary,
            error_message,
            sent_at: attempt.sent_at.into(),
        };

        let insert_result = self
            .database
            .collection::<DeliveryAttemptInsertEntity>(DELIVERY_ATTEMPTS)
            .insert_one(insert_entity)
            .await
            .map_err(Error::from_insert_error)?;

        match insert_result.inserted_id {
            Bson::ObjectId(id) => Ok(id),
            _ => Err(Error::invalid_inserted_id()),
        }
    }

    async fn exists_sent(
        &self,
        dispatch_id: Uuid,
        channel: DeliveryChannel,
        target_identifier: &str,
    ) -> Result<bool, repository::Error> {
        let count = self
            .database
            .collection::<Document>(DELIVERY_ATTEMPTS)
            .count_documents(doc! {
                "dispatch_id": bson::Uuid::from(dispatch_id),
                "channel": channel.as_ref(),
                "target_hash": target_hash(target_identifier),
                "status": DeliveryStatus::Sent.as_ref(),
            })
            .limit(1)
            .await?;

        Ok(count > 0)
    }
}
