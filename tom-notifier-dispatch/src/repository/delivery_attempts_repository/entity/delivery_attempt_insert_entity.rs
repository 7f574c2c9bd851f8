use bson::{DateTime, Document, Uuid};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct DeliveryAttemptInsertEntity {
    pub dispatch_id: Uuid,
    pub recipient_id: Option<i64>,

    pub channel: String,
    pub target_identifier: String,
    pub target_hash: String,

    pub title: String,
    pub body: String,
    pub payload: Document,

    pub status: String,
    pub failure_kind: Option<String>,
    pub response_summary: String,
    pub error_message: Option<String>,

    pub sent_at: DateTime,
}
