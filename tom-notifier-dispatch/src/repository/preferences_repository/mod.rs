mod dto;
mod entity;
mod preferences_repository;
mod preferences_repository_impl;

pub use dto::NotificationPreferences;
pub use preferences_repository::*;
pub use preferences_repository_impl::*;
