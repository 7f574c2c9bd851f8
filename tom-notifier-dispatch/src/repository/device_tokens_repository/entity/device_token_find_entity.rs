use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct DeviceTokenFindEntity {
    pub _id: ObjectId,

    pub owner_id: i64,

    pub token: String,
    pub kind: String,
    pub p256dh: Option<String>,
    pub auth: Option<String>,

    pub is_active: bool,
    pub last_used_at: Option<DateTime>,
}
