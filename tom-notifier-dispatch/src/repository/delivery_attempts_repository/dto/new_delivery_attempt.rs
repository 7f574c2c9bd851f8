use crate::dto::{DeliveryChannel, DeliveryStatus, FailureKind};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct NewDeliveryAttempt {
    pub dispatch_id: Uuid,
    pub recipient_id: Option<i64>,
    pub channel: DeliveryChannel,
    /// Full token, endpoint or email address
    pub target_identifier: String,
    pub title: String,
    pub body: String,
    pub payload: Map<String, Value>,
    pub status: DeliveryStatus,
    pub failure_kind: Option<FailureKind>,
    pub response_summary: String,
    pub error_message: Option<String>,
    pub sent_at: OffsetDateTime,
}
