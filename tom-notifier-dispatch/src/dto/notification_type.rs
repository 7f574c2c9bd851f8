use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

///
/// Closed set of events that produce notifications.
/// String form is used as the stored `type` and in push payloads.
///
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ConnectionRequest,
    ConnectionAccepted,
    NewMessage,
    IncomingCall,
    ProfileUploadLike,
}
