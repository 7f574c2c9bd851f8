use super::NewDeliveryAttempt;
use crate::{dto::DeliveryChannel, repository};
use async_trait::async_trait;
use bson::oid::ObjectId;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Stored target identifiers are cut to this many characters
pub const MAX_TARGET_IDENTIFIER_LEN: usize = 255;

///
/// Write-once log of every external send attempt.
///
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryAttemptsRepository: Send + Sync {
    ///
    /// Inserts attempt. Stored target identifier is truncated to
    /// [MAX_TARGET_IDENTIFIER_LEN] characters next to the [target_hash]
    /// of the full one, a failed attempt without error message gets a generic one.
    ///
    async fn insert(&self, attempt: NewDeliveryAttempt) -> Result<ObjectId, repository::Error>;

    ///
    /// Checks if target was already successfully reached during the dispatch.
    /// Targets are compared by [target_hash] of the full identifier.
    ///
    async fn exists_sent(
        &self,
        dispatch_id: Uuid,
        channel: DeliveryChannel,
        target_identifier: &str,
    ) -> Result<bool, repository::Error>;
}

pub fn bounded_target_identifier(target_identifier: &str) -> String {
    target_identifier
        .chars()
        .take(MAX_TARGET_IDENTIFIER_LEN)
        .collect()
}

///
/// Hex encoded SHA-256 of the full target identifier.
/// Web Push endpoints sharing a long prefix still get distinct hashes.
///
pub fn target_hash(target_identifier: &str) -> String {
    format!("{:x}", Sha256::digest(target_identifier.as_bytes()))
}
