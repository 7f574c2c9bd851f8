use crate::{dto::DispatchEvent, error::Error};
use async_trait::async_trait;
use bson::oid::ObjectId;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordOutcome {
    Inserted(ObjectId),
    /// Inserted by previous attempt of the same dispatch
    AlreadyRecorded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EmailOutcome {
    Sent,
    Failed,
    AlreadySent,
    Skipped,
    /// Not started because the dispatch deadline passed
    Deferred,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub dispatch_id: Uuid,
    pub record: RecordOutcome,
    pub push_sent: usize,
    pub push_failed: usize,
    /// Targets reached by previous attempt
    pub push_already_sent: usize,
    /// Targets not started because the dispatch deadline passed
    pub push_deferred: usize,
    pub email: EmailOutcome,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DispatchService: Send + Sync {
    ///
    /// Delivers event to the recipient over in-app record, push and email, in this order.
    /// Channel failures are isolated and logged as delivery attempts.
    ///
    /// No send is started once `timeout` elapsed, sends already in flight
    /// finish and are logged.
    ///
    /// ### Errors
    /// - [Error::RecipientNotFound], [Error::ActorNotFound]
    /// before anything was recorded or sent
    /// - [Error::Database] when device tokens, preferences or delivery log
    /// could not be read, returned after every channel was attempted
    /// - [Error::Timeout] when some targets were not started in time
    ///
    async fn dispatch(
        &self,
        event: &DispatchEvent,
        timeout: Duration,
    ) -> Result<DispatchReport, Error>;
}
