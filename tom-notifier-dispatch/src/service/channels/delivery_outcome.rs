use crate::dto::{DeliveryStatus, FailureKind};

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub status: DeliveryStatus,
    pub response_summary: String,
    pub error_message: Option<String>,
    pub failure_kind: Option<FailureKind>,
}

impl DeliveryOutcome {
    pub fn sent(response_summary: impl Into<String>) -> Self {
        Self {
            status: DeliveryStatus::Sent,
            response_summary: response_summary.into(),
            error_message: None,
            failure_kind: None,
        }
    }

    pub fn failed(
        failure_kind: FailureKind,
        response_summary: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        let mut error_message = error_message.into();
        if error_message.is_empty() {
            error_message = "unknown error".to_string();
        }

        Self {
            status: DeliveryStatus::Failed,
            response_summary: response_summary.into(),
            error_message: Some(error_message),
            failure_kind: Some(failure_kind),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.status == DeliveryStatus::Sent
    }

    pub fn is_permanent_failure(&self) -> bool {
        self.failure_kind == Some(FailureKind::Permanent)
    }
}
