use super::DeviceToken;
use crate::repository;
use async_trait::async_trait;
use bson::oid::ObjectId;
use time::OffsetDateTime;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceTokensRepository: Send + Sync {
    ///
    /// Finds owner's tokens with is_active = true.
    /// Tokens of unknown kind are skipped.
    ///
    async fn find_active(&self, owner_id: i64) -> Result<Vec<DeviceToken>, repository::Error>;

    ///
    /// ### Errors
    /// - [repository::Error::NoDocumentUpdated] when token does not exist
    ///
    async fn deactivate(&self, id: ObjectId) -> Result<(), repository::Error>;

    ///
    /// ### Errors
    /// - [repository::Error::NoDocumentUpdated] when token does not exist
    ///
    async fn update_last_used_at(
        &self,
        id: ObjectId,
        last_used_at: OffsetDateTime,
    ) -> Result<(), repository::Error>;
}
