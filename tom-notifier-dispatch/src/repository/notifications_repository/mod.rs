mod dto;
mod entity;
mod notifications_repository;
mod notifications_repository_impl;

pub use dto::{NewNotificationRecord, NotificationRecord};
pub use notifications_repository::*;
pub use notifications_repository_impl::*;
