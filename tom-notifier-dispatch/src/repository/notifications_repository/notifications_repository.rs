use super::{NewNotificationRecord, NotificationRecord};
use crate::repository;
use async_trait::async_trait;
use bson::oid::ObjectId;
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationsRepository: Send + Sync {
    ///
    /// Inserts in-app notification record.
    /// Priority is clamped to 0..=10.
    ///
    /// ### Errors
    /// - [repository::Error::InsertUniqueViolation]
    /// when record with the same dispatch_id already exists
    ///
    async fn insert(&self, record: NewNotificationRecord) -> Result<ObjectId, repository::Error>;

    ///
    /// Marks record as read.
    ///
    /// ### Errors
    /// - [repository::Error::NoDocumentUpdated] when
    ///     - record does not exist
    ///     - record belongs to another recipient
    ///
    async fn mark_read(&self, id: ObjectId, recipient_id: i64) -> Result<(), repository::Error>;

    async fn find_by_dispatch_id(
        &self,
        dispatch_id: Uuid,
    ) -> Result<Option<NotificationRecord>, repository::Error>;
}
