use super::{AccessTokenError, AccessTokenProvider};
use crate::{
    dto::FailureKind,
    repository::DeviceToken,
    service::channels::{
        normalize_data, truncate_string, DeliveryOutcome, PushClient, PushMessage,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc, time::Duration};

const UNREGISTERED_ERROR_CODES: [&str; 3] = ["UNREGISTERED", "NotRegistered", "InvalidRegistration"];

/// Sequential requests of one send in the worst case: token exchange, v1 and legacy
pub const FCM_MAX_REQUESTS_PER_SEND: u32 = 3;

#[derive(Debug, Clone)]
pub struct FcmClientConfig {
    pub project_id: Option<String>,
    pub legacy_server_key: Option<String>,
    /// `https://fcm.googleapis.com`
    pub v1_base_url: String,
    /// `https://fcm.googleapis.com/fcm/send`
    pub legacy_url: String,
    pub timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
enum FcmError {
    #[error("not configured")]
    NotConfigured,

    #[error("access token: {0}")]
    AccessToken(#[from] AccessTokenError),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("token unregistered: {0}")]
    Unregistered(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl FcmError {
    fn is_unregistered(&self) -> bool {
        matches!(self, FcmError::Unregistered(_))
    }
}

#[derive(Serialize)]
struct V1Request<'a> {
    message: V1Message<'a>,
}

#[derive(Serialize)]
struct V1Message<'a> {
    token: &'a str,
    notification: Notification<'a>,
    data: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct Notification<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
struct V1Response {
    name: String,
}

#[derive(Deserialize)]
struct V1ErrorResponse {
    error: V1Error,
}

#[derive(Deserialize)]
struct V1Error {
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<V1ErrorDetail>,
}

#[derive(Deserialize)]
struct V1ErrorDetail {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

#[derive(Serialize)]
struct LegacyRequest<'a> {
    to: &'a str,
    notification: Notification<'a>,
    data: &'a BTreeMap<String, String>,
    priority: &'a str,
}

#[derive(Deserialize)]
struct LegacyResponse {
    success: i64,
    #[serde(default)]
    results: Vec<LegacyResult>,
}

#[derive(Deserialize)]
struct LegacyResult {
    message_id: Option<String>,
    error: Option<String>,
}

///
/// Firebase Cloud Messaging client.
/// Sends through the HTTP v1 API and falls back to the legacy API on any v1 failure.
///
pub struct FcmClient {
    config: FcmClientConfig,
    http_client: reqwest::Client,
    access_token_provider: Option<Arc<dyn AccessTokenProvider>>,
}

impl FcmClient {
    pub fn new(
        config: FcmClientConfig,
        access_token_provider: Option<Arc<dyn AccessTokenProvider>>,
    ) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            config,
            http_client,
            access_token_provider,
        })
    }

    async fn send_v1(
        &self,
        token: &str,
        message: &PushMessage,
        data: &BTreeMap<String, String>,
    ) -> Result<String, FcmError> {
        let (Some(project_id), Some(access_token_provider)) =
            (&self.config.project_id, &self.access_token_provider)
        else {
            return Err(FcmError::NotConfigured);
        };

        let access_token = access_token_provider.access_token().await?;
        let url = format!(
            "{}/v1/projects/{project_id}/messages:send",
            self.config.v1_base_url
        );
        let request = V1Request {
            message: V1Message {
                token,
                notification: Notification {
                    title: &message.title,
                    body: &message.body,
                },
                data,
            },
        };

        let response = self
            .http_client
            .post(url)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let unregistered = serde_json::from_str::<V1ErrorResponse>(&body)
                .map(|response| {
                    response.error.details.iter().any(|detail| {
                        detail
                            .error_code
                            .as_deref()
                            .is_some_and(|code| UNREGISTERED_ERROR_CODES.contains(&code))
                    }) || UNREGISTERED_ERROR_CODES.contains(&response.error.status.as_str())
                })
                .unwrap_or(false);

            return Err(match unregistered {
                true => FcmError::Unregistered(truncate_string(&body, 200)),
                false => FcmError::Status {
                    status: status.as_u16(),
                    body: truncate_string(&body, 200),
                },
            });
        }

        let response = serde_json::from_str::<V1Response>(&body)
            .map_err(|err| FcmError::MalformedResponse(err.to_string()))?;

        Ok(format!("fcm v1: {}", response.name))
    }

    async fn send_legacy(
        &self,
        token: &str,
        message: &PushMessage,
        data: &BTreeMap<String, String>,
    ) -> Result<String, FcmError> {
        let Some(server_key) = &self.config.legacy_server_key else {
            return Err(FcmError::NotConfigured);
        };

        let request = LegacyRequest {
            to: token,
            notification: Notification {
                title: &message.title,
                body: &message.body,
            },
            data,
            priority: "high",
        };

        let response = self
            .http_client
            .post(&self.config.legacy_url)
            .header(reqwest::header::AUTHORIZATION, format!("key={server_key}"))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FcmError::Status {
                status: status.as_u16(),
                body: truncate_string(&body, 200),
            });
        }

        let response = serde_json::from_str::<LegacyResponse>(&body)
            .map_err(|err| FcmError::MalformedResponse(err.to_string()))?;
        let result = response.results.into_iter().next();

        if response.success > 0 {
            let message_id = result
                .and_then(|result| result.message_id)
                .unwrap_or_else(|| "sent".to_string());
            return Ok(format!("fcm legacy: {message_id}"));
        }

        match result {
            Some(LegacyResult {
                error: Some(error), ..
            }) => match UNREGISTERED_ERROR_CODES.contains(&error.as_str()) {
                true => Err(FcmError::Unregistered(error)),
                false => Err(FcmError::Status {
                    status: status.as_u16(),
                    body: error,
                }),
            },
            _ => Err(FcmError::MalformedResponse(truncate_string(&body, 200))),
        }
    }
}

#[async_trait]
impl PushClient for FcmClient {
    #[tracing::instrument(name = "FCM Client", skip_all)]
    async fn send(&self, token: &DeviceToken, message: &PushMessage) -> DeliveryOutcome {
        // both APIs must see the same data
        let data = normalize_data(&message.data);

        let v1_error = match self.send_v1(&token.token, message, &data).await {
            Ok(summary) => return DeliveryOutcome::sent(summary),
            Err(err) => err,
        };
        tracing::warn!(err = %v1_error, "fcm v1 failed, falling back to legacy api");

        let legacy_error = match self.send_legacy(&token.token, message, &data).await {
            Ok(summary) => return DeliveryOutcome::sent(summary),
            Err(err) => err,
        };
        tracing::warn!(err = %legacy_error, "fcm legacy failed");

        let failure_kind = match v1_error.is_unregistered() || legacy_error.is_unregistered() {
            true => FailureKind::Permanent,
            false => FailureKind::Transient,
        };
        let error_message = format!("fcm v1: {v1_error}; fcm legacy: {legacy_error}");

        DeliveryOutcome::failed(failure_kind, error_message.clone(), error_message)
    }
}
