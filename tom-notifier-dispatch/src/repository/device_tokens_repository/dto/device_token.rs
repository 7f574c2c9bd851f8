use crate::repository::device_tokens_repository::entity::DeviceTokenFindEntity;
use bson::oid::ObjectId;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceToken {
    pub _id: ObjectId,
    pub owner_id: i64,
    /// Registration token or Web Push endpoint
    pub token: String,
    pub kind: DeviceTokenKind,
    pub is_active: bool,
    pub last_used_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceTokenKind {
    Fcm,
    Expo,
    WebPush {
        p256dh: Option<String>,
        auth: Option<String>,
    },
}

impl TryFrom<DeviceTokenFindEntity> for DeviceToken {
    type Error = String;

    fn try_from(value: DeviceTokenFindEntity) -> Result<Self, Self::Error> {
        let kind = match value.kind.as_str() {
            "fcm" => DeviceTokenKind::Fcm,
            "expo" => DeviceTokenKind::Expo,
            "webpush" => DeviceTokenKind::WebPush {
                p256dh: value.p256dh,
                auth: value.auth,
            },
            other => return Err(other.to_string()),
        };

        Ok(Self {
            _id: value._id,
            owner_id: value.owner_id,
            token: value.token,
            kind,
            is_active: value.is_active,
            last_used_at: value.last_used_at.map(OffsetDateTime::from),
        })
    }
}
