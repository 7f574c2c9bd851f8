use crate::{dto::DispatchJob, service::dispatch_service::DispatchReport};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(DispatchReport),
    /// Job should run again as `next_attempt` after `delay`
    Retry { next_attempt: u32, delay: Duration },
    /// Job is dropped, failure handler was already called
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchJobServiceConfig {
    /// Overrides attempt budget of every notification type
    pub max_attempts: Option<u32>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DispatchJobService: Send + Sync {
    ///
    /// Runs one attempt of the job within the notification type's timeout
    /// and decides what happens with the job next.
    ///
    async fn run(&self, job: &DispatchJob) -> JobOutcome;
}
