use bson::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct UserFindEntity {
    pub _id: i64,
    pub name: String,
    pub email: Option<String>,
    pub email_verified_at: Option<DateTime>,
}
