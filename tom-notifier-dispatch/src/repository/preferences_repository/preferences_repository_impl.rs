use super::{entity::NotificationPreferencesFindEntity, NotificationPreferences, PreferencesRepository};
use crate::repository;
use async_trait::async_trait;
use bson::doc;
use mongodb::Database;

const NOTIFICATION_PREFERENCES: &str = "notification_preferences";

pub struct PreferencesRepositoryImpl {
    database: Database,
}

impl PreferencesRepositoryImpl {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl PreferencesRepository for PreferencesRepositoryImpl {
    async fn find(&self, owner_id: i64) -> Result<NotificationPreferences, repository::Error> {
        let preferences = self
            .database
            .collection::<NotificationPreferencesFindEntity>(NOTIFICATION_PREFERENCES)
            .find_one(doc! {
                "owner_id": owner_id,
            })
            .await?
            .map(|entity| NotificationPreferences {
                settings: entity.settings,
            })
            .unwrap_or_default();

        Ok(preferences)
    }
}
