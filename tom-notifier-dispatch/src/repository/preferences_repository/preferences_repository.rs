use super::NotificationPreferences;
use crate::repository;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreferencesRepository: Send + Sync {
    ///
    /// Finds owner's notification preferences.
    /// Owner without stored preferences gets empty settings.
    ///
    async fn find(&self, owner_id: i64) -> Result<NotificationPreferences, repository::Error>;
}
