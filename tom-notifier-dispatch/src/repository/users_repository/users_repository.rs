use super::User;
use crate::repository;
use async_trait::async_trait;

///
/// Read only access to users of the social application.
///
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsersRepository: Send + Sync {
    async fn find(&self, id: i64) -> Result<Option<User>, repository::Error>;
}
