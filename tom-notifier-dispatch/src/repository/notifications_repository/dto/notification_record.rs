use crate::{
    dto::NotificationType,
    repository::notifications_repository::entity::NotificationRecordFindEntity,
};
use bson::{oid::ObjectId, Bson};
use serde_json::{Map, Value};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub _id: ObjectId,
    pub dispatch_id: Uuid,
    pub recipient_id: i64,
    pub title: String,
    pub message: String,
    pub notification_type: Option<NotificationType>,
    pub sender_id: Option<i64>,
    pub priority: u8,
    pub action_url: Option<String>,
    pub payload: Map<String, Value>,
    pub created_at: OffsetDateTime,
    pub read: bool,
}

impl From<NotificationRecordFindEntity> for NotificationRecord {
    fn from(value: NotificationRecordFindEntity) -> Self {
        let payload = match Bson::Document(value.payload).into_relaxed_extjson() {
            Value::Object(payload) => payload,
            _ => Map::new(),
        };

        Self {
            _id: value._id,
            dispatch_id: value.dispatch_id.into(),
            recipient_id: value.recipient_id,
            title: value.title,
            message: value.message,
            notification_type: NotificationType::from_str(&value.notification_type).ok(),
            sender_id: value.sender_id,
            priority: value.priority.clamp(0, 10) as u8,
            action_url: value.action_url,
            payload,
            created_at: value.created_at.into(),
            read: value.read,
        }
    }
}
