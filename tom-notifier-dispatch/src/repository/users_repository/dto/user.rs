use crate::repository::users_repository::entity::UserFindEntity;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub email_verified: bool,
}

impl From<UserFindEntity> for User {
    fn from(value: UserFindEntity) -> Self {
        Self {
            id: value._id,
            name: value.name,
            email: value.email,
            email_verified: value.email_verified_at.is_some(),
        }
    }
}
