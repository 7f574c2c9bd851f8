use crate::dto::NotificationType;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotificationRecord {
    pub dispatch_id: Uuid,
    pub recipient_id: i64,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub sender_id: Option<i64>,
    pub priority: u8,
    pub action_url: Option<String>,
    pub payload: Map<String, Value>,
    pub created_at: OffsetDateTime,
}
