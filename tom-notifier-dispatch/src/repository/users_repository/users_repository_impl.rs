use super::{entity::UserFindEntity, User, UsersRepository};
use crate::repository;
use async_trait::async_trait;
use bson::doc;
use mongodb::Database;

const USERS: &str = "users";

pub struct UsersRepositoryImpl {
    database: Database,
}

impl UsersRepositoryImpl {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl UsersRepository for UsersRepositoryImpl {
    async fn find(&self, id: i64) -> Result<Option<User>, repository::Error> {
        let user = self
            .database
            .collection::<UserFindEntity>(USERS)
            .find_one(doc! {
                "_id": id,
            })
            .await?
            .map(User::from);

        Ok(user)
    }
}
