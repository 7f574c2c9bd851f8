use super::DeliveryOutcome;
use crate::repository::DeviceToken;
use async_trait::async_trait;
use serde_json::{Map, Value};

///
/// Message sent to every push target of a recipient.
///
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: Map<String, Value>,
    /// 0..=10
    pub priority: u8,
    /// Notification type, used to collapse notifications of one kind
    pub tag: String,
    pub require_interaction: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub template: String,
    pub variables: Map<String, Value>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushClient: Send + Sync {
    async fn send(&self, token: &DeviceToken, message: &PushMessage) -> DeliveryOutcome;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailClient: Send + Sync {
    async fn send(&self, email: &EmailMessage) -> DeliveryOutcome;
}
