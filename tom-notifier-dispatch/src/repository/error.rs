use mongodb::error::{ErrorKind, WriteFailure};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("insert unique violation")]
    InsertUniqueViolation,

    #[error("no document updated")]
    NoDocumentUpdated,

    #[error("mongo error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

impl Error {
    pub(super) fn from_insert_error(err: mongodb::error::Error) -> Self {
        let ErrorKind::Write(ref write_failure) = *err.kind else {
            return Error::Mongo(err);
        };

        let WriteFailure::WriteError(write_error) = write_failure else {
            return Error::Mongo(err);
        };

        const DUPLICATE_KEY_CODE: i32 = 11000;
        match write_error.code == DUPLICATE_KEY_CODE {
            true => Error::InsertUniqueViolation,
            false => Error::Mongo(err),
        }
    }

    pub(super) fn invalid_inserted_id() -> Self {
        Error::Mongo(
            ErrorKind::Custom(std::sync::Arc::new("invalid type of returned id")).into(),
        )
    }
}
