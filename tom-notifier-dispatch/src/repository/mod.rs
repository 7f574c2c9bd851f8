mod delivery_attempts_repository;
mod device_tokens_repository;
mod error;
mod notifications_repository;
mod preferences_repository;
mod users_repository;

pub use delivery_attempts_repository::*;
pub use device_tokens_repository::*;
pub use error::*;
pub use notifications_repository::*;
pub use preferences_repository::*;
pub use users_repository::*;

use mongodb::{error::ErrorKind, Database};

///
/// Creates collection, existing collection is not an error.
///
async fn ensure_collection(database: &Database, name: &str) -> Result<(), mongodb::error::Error> {
    const NAMESPACE_EXISTS_CODE: i32 = 48;

    match database.create_collection(name).await {
        Err(err)
            if matches!(
                *err.kind,
                ErrorKind::Command(ref command_error) if command_error.code == NAMESPACE_EXISTS_CODE
            ) =>
        {
            Ok(())
        }
        result => result,
    }
}

#[cfg(test)]
pub mod test {
    use crate::application::ApplicationEnv;
    use mongodb::{options::ClientOptions, Client, Database};
    use std::sync::Once;
    use uuid::Uuid;

    static BEFORE_ALL: Once = Once::new();

    pub async fn create_test_database() -> Database {
        BEFORE_ALL.call_once(|| {
            let _ = dotenvy::dotenv();
        });

        let env = ApplicationEnv::parse().unwrap();
        let db_name = format!("test_{}", Uuid::new_v4());

        println!("creating test database: {db_name}");

        let db_client_options = ClientOptions::parse(env.db_connection_string)
            .await
            .unwrap();
        let db_client = Client::with_options(db_client_options).unwrap();

        db_client.database(&db_name)
    }

    pub async fn destroy_test_database(database: Database) {
        let _ = database.drop().await;
        database.client().clone().shutdown().await;
    }
}
