use crate::{dto::DispatchJob, error::Error};
use async_trait::async_trait;

///
/// Called exactly once for a job that won't be attempted again.
///
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DispatchFailureHandler: Send + Sync {
    async fn handle(&self, job: &DispatchJob, err: &Error);
}

pub struct LoggingDispatchFailureHandler;

#[async_trait]
impl DispatchFailureHandler for LoggingDispatchFailureHandler {
    async fn handle(&self, job: &DispatchJob, err: &Error) {
        let event = &job.event;
        tracing::error!(
            notification_type = %event.notification_type,
            actor_id = event.actor_id,
            recipient_id = event.recipient_id,
            context = ?event.context,
            attempt = job.attempt,
            occurred_at = %event.occurred_at,
            %err,
            "dispatch permanently failed"
        );
    }
}
