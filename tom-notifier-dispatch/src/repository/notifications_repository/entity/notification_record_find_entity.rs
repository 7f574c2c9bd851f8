use bson::{oid::ObjectId, DateTime, Document, Uuid};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct NotificationRecordFindEntity {
    pub _id: ObjectId,
    pub dispatch_id: Uuid,

    pub recipient_id: i64,

    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub sender_id: Option<i64>,
    pub priority: i32,
    pub action_url: Option<String>,
    #[serde(default)]
    pub payload: Document,

    pub created_at: DateTime,
    pub read: bool,
}
