use crate::repository;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("recipient {0} not found")]
    RecipientNotFound(i64),

    #[error("actor {0} not found")]
    ActorNotFound(i64),

    #[error("dispatch timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(#[from] repository::Error),
}

impl Error {
    ///
    /// Missing entities won't appear by running the dispatch again.
    ///
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RecipientNotFound(_) | Error::ActorNotFound(_) => false,
            Error::Timeout(_) | Error::Database(_) => true,
        }
    }
}
