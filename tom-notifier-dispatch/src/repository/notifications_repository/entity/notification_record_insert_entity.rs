use bson::{DateTime, Document, Uuid};
use serde::Serialize;

#[derive(Serialize)]
pub struct NotificationRecordInsertEntity<'a> {
    pub dispatch_id: Uuid,

    pub recipient_id: i64,

    pub title: &'a str,
    pub message: &'a str,
    #[serde(rename = "type")]
    pub notification_type: &'a str,
    pub sender_id: Option<i64>,
    pub priority: i32,
    pub action_url: Option<&'a str>,
    pub payload: Document,

    pub created_at: DateTime,
    pub read: bool,
}
