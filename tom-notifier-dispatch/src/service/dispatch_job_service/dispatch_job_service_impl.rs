use super::{DispatchFailureHandler, DispatchJobService, DispatchJobServiceConfig, JobOutcome};
use crate::{
    dto::DispatchJob,
    error::Error,
    service::{dispatch_service::DispatchService, event_templates},
};
use async_trait::async_trait;
use std::sync::Arc;

pub struct DispatchJobServiceImpl {
    config: DispatchJobServiceConfig,
    dispatch_service: Arc<dyn DispatchService>,
    failure_handler: Arc<dyn DispatchFailureHandler>,
}

impl DispatchJobServiceImpl {
    pub fn new(
        config: DispatchJobServiceConfig,
        dispatch_service: Arc<dyn DispatchService>,
        failure_handler: Arc<dyn DispatchFailureHandler>,
    ) -> Self {
        Self {
            config,
            dispatch_service,
            failure_handler,
        }
    }
}

#[async_trait]
impl DispatchJobService for DispatchJobServiceImpl {
    #[tracing::instrument(
        name = "Dispatch Job",
        skip_all,
        fields(notification_type = %job.event.notification_type, attempt = job.attempt)
    )]
    async fn run(&self, job: &DispatchJob) -> JobOutcome {
        let template = event_templates::template(job.event.notification_type);
        let retry = match self.config.max_attempts {
            Some(max_attempts) => template.retry.with_max_attempts(max_attempts),
            None => template.retry,
        };

        let result = self
            .dispatch_service
            .dispatch(&job.event, template.timeout)
            .await;

        let err = match result {
            Ok(report) => return JobOutcome::Completed(report),
            Err(err) => err,
        };

        if err.is_retryable() {
            if let Some(delay) = retry.delay_after(job.attempt) {
                tracing::warn!(%err, ?delay, "dispatch failed, retrying");
                return JobOutcome::Retry {
                    next_attempt: job.attempt + 1,
                    delay,
                };
            }
        }

        self.failure_handler.handle(job, &err).await;

        JobOutcome::Failed
    }
}
