mod delivery_attempts_repository;
mod delivery_attempts_repository_impl;
mod dto;
mod entity;

pub use delivery_attempts_repository::*;
pub use delivery_attempts_repository_impl::*;
pub use dto::NewDeliveryAttempt;
