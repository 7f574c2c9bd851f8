mod delivery_attempt_insert_entity;

pub use delivery_attempt_insert_entity::*;
