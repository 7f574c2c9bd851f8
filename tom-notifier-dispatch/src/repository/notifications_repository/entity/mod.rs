mod notification_record_find_entity;
mod notification_record_insert_entity;

pub use notification_record_find_entity::*;
pub use notification_record_insert_entity::*;
