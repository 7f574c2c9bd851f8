use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Serialize, Deserialize)]
pub struct NotificationPreferencesFindEntity {
    pub owner_id: i64,

    #[serde(default)]
    pub settings: HashMap<String, bool>,
}
