mod dto;
mod entity;
mod users_repository;
mod users_repository_impl;

pub use dto::User;
pub use users_repository::*;
pub use users_repository_impl::*;
