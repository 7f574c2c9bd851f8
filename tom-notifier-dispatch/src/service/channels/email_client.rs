use super::{truncate_string, DeliveryOutcome, EmailClient, EmailMessage};
use crate::dto::FailureKind;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpEmailClientConfig {
    pub url: String,
    pub api_key: String,
    pub sender: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct EmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    template: &'a str,
    variables: &'a Map<String, Value>,
}

///
/// Sends templated emails through a transactional email HTTP API.
///
pub struct HttpEmailClient {
    config: HttpEmailClientConfig,
    http_client: reqwest::Client,
}

impl HttpEmailClient {
    pub fn new(config: HttpEmailClientConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl EmailClient for HttpEmailClient {
    #[tracing::instrument(name = "Email Client", skip_all, fields(template = %email.template))]
    async fn send(&self, email: &EmailMessage) -> DeliveryOutcome {
        let request = EmailRequest {
            from: &self.config.sender,
            to: &email.to,
            subject: &email.subject,
            template: &email.template,
            variables: &email.variables,
        };

        let response = match self
            .http_client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(%err, "email request failed");
                return DeliveryOutcome::failed(
                    FailureKind::Transient,
                    "email: request failed",
                    err.to_string(),
                );
            }
        };

        let status = response.status();
        if status.is_success() {
            return DeliveryOutcome::sent(format!("email: {status}"));
        }

        let body = response.text().await.unwrap_or_default();
        let failure_kind = match status.is_client_error() && status.as_u16() != 429 {
            true => FailureKind::Permanent,
            false => FailureKind::Transient,
        };
        let error_message = match body.is_empty() {
            true => format!("status {status}"),
            false => truncate_string(&body, 200),
        };

        DeliveryOutcome::failed(failure_kind, format!("email: {status}"), error_message)
    }
}
