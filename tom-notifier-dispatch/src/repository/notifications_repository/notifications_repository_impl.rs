use super::{
    entity::{NotificationRecordFindEntity, NotificationRecordInsertEntity},
    NewNotificationRecord, NotificationRecord, NotificationsRepository,
};
use crate::repository::{self, Error};
use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::{options::IndexOptions, Database, IndexModel};
use uuid::Uuid;

const NOTIFICATIONS: &str = "notifications";
const INDEX_NAME_UNIQUE_DISPATCH_ID: &str = "unique_dispatch_id";
const INDEX_NAME_RECIPIENT_ID_CREATED_AT: &str = "index_recipient_id_created_at";

pub struct NotificationsRepositoryImpl {
    database: Database,
}

impl NotificationsRepositoryImpl {
    pub async fn new(database: Database) -> Result<Self, mongodb::error::Error> {
        tracing::debug!(collection = NOTIFICATIONS, "creating collection");
        repository::ensure_collection(&database, NOTIFICATIONS).await?;

        let collection = database.collection::<Document>(NOTIFICATIONS);

        tracing::debug!("fetching index names");
        let index_names = collection.list_index_names().await?;

        if !index_names.contains(&INDEX_NAME_UNIQUE_DISPATCH_ID.to_string()) {
            collection
                .create_index(
                    IndexModel::builder()
                        .keys(doc! {
                            "dispatch_id": 1,
                        })
                        .options(
                            IndexOptions::builder()
                                .name(INDEX_NAME_UNIQUE_DISPATCH_ID.to_string())
                                .unique(true)
                                .build(),
                        )
                        .build(),
                )
                .await?;
            tracing::debug!(
                collection = NOTIFICATIONS,
                index = INDEX_NAME_UNIQUE_DISPATCH_ID,
                "created index"
            );
        }
        if !index_names.contains(&INDEX_NAME_RECIPIENT_ID_CREATED_AT.to_string()) {
            collection
                .create_index(
                    IndexModel::builder()
                        .keys(doc! {
                            "recipient_id": 1,
                            "created_at": -1,
                        })
                        .options(
                            IndexOptions::builder()
                                .name(INDEX_NAME_RECIPIENT_ID_CREATED_AT.to_string())
                                .build(),
                        )
                        .build(),
                )
                .await?;
            tracing::debug!(
                collection = NOTIFICATIONS,
                index = INDEX_NAME_RECIPIENT_ID_CREATED_AT,
                "created index"
            );
        }

        Ok(Self { database })
    }
}

#[async_trait]
impl NotificationsRepository for NotificationsRepositoryImpl {
    async fn insert(&self, record: NewNotificationRecord) -> Result<ObjectId, repository::Error> {
        let payload = bson::to_document(&record.payload).map_err(|err| Error::Mongo(err.into()))?;
        let insert_entity = NotificationRecordInsertEntity {
            dispatch_id: record.dispatch_id.into(),
            recipient_id: record.recipient_id,
            title: &record.title,
            message: &record.message,
            notification_type: record.notification_type.as_ref(),
            sender_id: record.sender_id,
            priority: i32::from(record.priority.min(10)),
            action_url: record.action_url.as_deref(),
            payload,
            created_at: record.created_at.into(),
            read: false,
        };

        let insert_result = self
            .database
            .collection::<NotificationRecordInsertEntity>(NOTIFICATIONS)
            .insert_one(insert_entity)
            .await
            .map_err(Error::from_insert_error)?;

        match insert_result.inserted_id {
            Bson::ObjectId(id) => Ok(id),
            _ => Err(Error::invalid_inserted_id()),
        }
    }

    async fn mark_read(&self, id: ObjectId, recipient_id: i64) -> Result<(), repository::Error> {
        let update_result = self
            .database
            .collection::<Document>(NOTIFICATIONS)
            .update_one(
                doc! {
                    "_id": id,
                    "recipient_id": recipient_id,
                },
                doc! {
                    "$set": {
                        "read": true,
                    }
                },
            )
            .await?;

        match update_result.matched_count == 1 {
            true => Ok(()),
            false => Err(Error::NoDocumentUpdated),
        }
    }

    async fn find_by_dispatch_id(
        &self,
        dispatch_id: Uuid,
    ) -> Result<Option<NotificationRecord>, repository::Error> {
        let record = self
            .database
            .collection::<NotificationRecordFindEntity>(NOTIFICATIONS)
            .find_one(doc! {
                "dispatch_id": bson::Uuid::from(dispatch_id),
            })
            .await?
            .map(NotificationRecord::from);

        Ok(record)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        dto::NotificationType,
        repository::test::{create_test_database, destroy_test_database},
    };
    use serde_json::{json, Map};
    use time::OffsetDateTime;

    fn new_record(dispatch_id: Uuid, recipient_id: i64) -> NewNotificationRecord {
        let mut payload = Map::new();
        payload.insert("request_id".to_string(), json!("15"));
        payload.insert("nested".to_string(), json!({ "a": [1, 2] }));

        NewNotificationRecord {
            dispatch_id,
            recipient_id,
            title: "New Connection Request".to_string(),
            message: "Ann wants to connect with you".to_string(),
            notification_type: NotificationType::ConnectionRequest,
            sender_id: Some(1),
            priority: 42,
            action_url: Some("/connections/requests".to_string()),
            payload,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    #[ignore = "requires running MongoDB"]
    async fn insert_values_unchanged() {
        let db = create_test_database().await;
        let repository = NotificationsRepositoryImpl::new(db.clone()).await.unwrap();

        let dispatch_id = Uuid::new_v4();
        let record = new_record(dispatch_id, 2);
        let id = repository.insert(record.clone()).await.unwrap();

        let found = repository
            .find_by_dispatch_id(dispatch_id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found._id, id);
        assert_eq!(found.recipient_id, 2);
        assert_eq!(found.title, record.title);
        assert_eq!(found.message, record.message);
        assert_eq!(
            found.notification_type,
            Some(NotificationType::ConnectionRequest)
        );
        assert_eq!(found.sender_id, Some(1));
        assert_eq!(found.priority, 10);
        assert_eq!(found.action_url, record.action_url);
        assert_eq!(found.payload, record.payload);
        assert!(!found.read);

        destroy_test_database(db).await;
    }

    #[tokio::test]
    #[ignore = "requires running MongoDB"]
    async fn insert_duplicate_dispatch_id_rejected() {
        let db = create_test_database().await;
        let repository = NotificationsRepositoryImpl::new(db.clone()).await.unwrap();

        let dispatch_id = Uuid::new_v4();
        repository.insert(new_record(dispatch_id, 2)).await.unwrap();
        let result = repository.insert(new_record(dispatch_id, 2)).await;

        assert!(matches!(result, Err(Error::InsertUniqueViolation)));

        destroy_test_database(db).await;
    }

    #[tokio::test]
    #[ignore = "requires running MongoDB"]
    async fn mark_read_by_recipient() {
        let db = create_test_database().await;
        let repository = NotificationsRepositoryImpl::new(db.clone()).await.unwrap();

        let dispatch_id = Uuid::new_v4();
        let id = repository.insert(new_record(dispatch_id, 2)).await.unwrap();

        repository.mark_read(id, 2).await.unwrap();

        let found = repository
            .find_by_dispatch_id(dispatch_id)
            .await
            .unwrap()
            .unwrap();
        assert!(found.read);

        destroy_test_database(db).await;
    }

    #[tokio::test]
    #[ignore = "requires running MongoDB"]
    async fn mark_read_other_recipient_no_document_updated() {
        let db = create_test_database().await;
        let repository = NotificationsRepositoryImpl::new(db.clone()).await.unwrap();

        let id = repository
            .insert(new_record(Uuid::new_v4(), 2))
            .await
            .unwrap();

        let result = repository.mark_read(id, 3).await;
        assert!(matches!(result, Err(Error::NoDocumentUpdated)));

        let result = repository.mark_read(ObjectId::new(), 2).await;
        assert!(matches!(result, Err(Error::NoDocumentUpdated)));

        destroy_test_database(db).await;
    }
}
