mod notification_preferences;

pub use notification_preferences::*;
