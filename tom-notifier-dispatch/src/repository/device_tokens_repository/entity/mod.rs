mod device_token_find_entity;

pub use device_token_find_entity::*;
