use super::{entity::DeviceTokenFindEntity, DeviceToken, DeviceTokensRepository};
use crate::repository::{self, Error};
use async_trait::async_trait;
use bson::{doc, oid::ObjectId, DateTime, Document};
use futures_util::TryStreamExt;
use mongodb::{options::IndexOptions, Database, IndexModel};
use time::OffsetDateTime;

const DEVICE_TOKENS: &str = "device_tokens";
const INDEX_NAME_OWNER_ID_IS_ACTIVE: &str = "index_owner_id_is_active";

pub struct DeviceTokensRepositoryImpl {
    database: Database,
}

impl DeviceTokensRepositoryImpl {
    pub async fn new(database: Database) -> Result<Self, mongodb::error::Error> {
        let collection = database.collection::<Document>(DEVICE_TOKENS);

        tracing::debug!("fetching index names");
        // collection is owned by the social application and may not exist yet
        let index_names = collection.list_index_names().await.unwrap_or_default();

        if !index_names.contains(&INDEX_NAME_OWNER_ID_IS_ACTIVE.to_string()) {
            collection
                .create_index(
                    IndexModel::builder()
                        .keys(doc! {
                            "owner_id": 1,
                            "is_active": 1,
                        })
                        .options(
                            IndexOptions::builder()
                                .name(INDEX_NAME_OWNER_ID_IS_ACTIVE.to_string())
                                .build(),
                        )
                        .build(),
                )
                .await?;
            tracing::debug!(
                collection = DEVICE_TOKENS,
                index = INDEX_NAME_OWNER_ID_IS_ACTIVE,
                "created index"
            );
        }

        Ok(Self { database })
    }

    async fn update_one(&self, id: ObjectId, set: Document) -> Result<(), repository::Error> {
        let update_result = self
            .database
            .collection::<Document>(DEVICE_TOKENS)
            .update_one(doc! { "_id": id }, doc! { "$set": set })
            .await?;

        match update_result.matched_count == 1 {
            true => Ok(()),
            false => Err(Error::NoDocumentUpdated),
        }
    }
}

#[async_trait]
impl DeviceTokensRepository for DeviceTokensRepositoryImpl {
    async fn find_active(&self, owner_id: i64) -> Result<Vec<DeviceToken>, repository::Error> {
        let entities = self
            .database
            .collection::<DeviceTokenFindEntity>(DEVICE_TOKENS)
            .find(doc! {
                "owner_id": owner_id,
                "is_active": true,
            })
            .await?
            .try_collect::<Vec<_>>()
            .await?;

        let tokens = entities
            .into_iter()
            .filter_map(|entity| {
                let id = entity._id;
                match DeviceToken::try_from(entity) {
                    Ok(token) => Some(token),
                    Err(kind) => {
                        tracing::warn!(%id, %kind, "skipping device token of unknown kind");
                        None
                    }
                }
            })
            .collect();

        Ok(tokens)
    }

    async fn deactivate(&self, id: ObjectId) -> Result<(), repository::Error> {
        self.update_one(id, doc! { "is_active": false }).await
    }

    async fn update_last_used_at(
        &self,
        id: ObjectId,
        last_used_at: OffsetDateTime,
    ) -> Result<(), repository::Error> {
        self.update_one(id, doc! { "last_used_at": DateTime::from(last_used_at) })
            .await
    }
}
