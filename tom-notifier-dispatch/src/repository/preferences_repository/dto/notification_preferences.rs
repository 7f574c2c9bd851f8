use std::collections::HashMap;

///
/// Recipient's boolean toggles, unset keys are treated as enabled.
///
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationPreferences {
    pub settings: HashMap<String, bool>,
}

impl NotificationPreferences {
    pub fn is_enabled(&self, key: &str) -> bool {
        self.settings.get(key).copied().unwrap_or(true)
    }
}
