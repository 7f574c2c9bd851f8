use crate::repository::DeviceTokenKind;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    Fcm,
    Expo,
    #[strum(serialize = "webpush")]
    #[serde(rename = "webpush")]
    WebPush,
    Email,
}

impl From<&DeviceTokenKind> for DeliveryChannel {
    fn from(kind: &DeviceTokenKind) -> Self {
        match kind {
            DeviceTokenKind::Fcm => DeliveryChannel::Fcm,
            DeviceTokenKind::Expo => DeliveryChannel::Expo,
            DeviceTokenKind::WebPush { .. } => DeliveryChannel::WebPush,
        }
    }
}

impl DeliveryChannel {
    pub fn is_push(&self) -> bool {
        !matches!(self, DeliveryChannel::Email)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

///
/// Classification of a failed send.
///
/// - `Validation` target rejected locally, nothing was sent
/// - `Transient` provider or network failure, worth retrying
/// - `Permanent` provider reports the target as invalid or unregistered
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Transient,
    Permanent,
}
