mod notification_preferences_find_entity;

pub use notification_preferences_find_entity::*;
