use super::{
    encryption,
    vapid::Vapid,
};
use crate::{
    dto::FailureKind,
    repository::{DeviceToken, DeviceTokenKind},
    service::channels::{truncate_string, DeliveryOutcome, PushClient, PushMessage},
};
use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WebPushClientConfig {
    /// Uncompressed P-256 point, base64url
    pub vapid_public_key: String,
    /// Raw P-256 scalar, base64url
    pub vapid_private_key: String,
    /// `mailto:` or `https:` contact of the application server
    pub subject: String,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub ttl: Duration,
    pub timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebPushPayload<'a> {
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<&'a str>,
    data: &'a Map<String, Value>,
    require_interaction: bool,
    tag: &'a str,
}

pub struct WebPushClient {
    config: WebPushClientConfig,
    vapid: Vapid,
    http_client: reqwest::Client,
}

impl WebPushClient {
    pub fn new(config: WebPushClientConfig) -> anyhow::Result<Self> {
        let vapid = Vapid::new(
            &config.vapid_public_key,
            &config.vapid_private_key,
            config.subject.clone(),
        )?;
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            config,
            vapid,
            http_client,
        })
    }

    fn urgency(priority: u8) -> &'static str {
        match priority {
            8..=u8::MAX => "high",
            5..=7 => "normal",
            _ => "low",
        }
    }
}

#[async_trait]
impl PushClient for WebPushClient {
    #[tracing::instrument(name = "Web Push Client", skip_all)]
    async fn send(&self, token: &DeviceToken, message: &PushMessage) -> DeliveryOutcome {
        let DeviceTokenKind::WebPush { p256dh, auth } = &token.kind else {
            return DeliveryOutcome::failed(
                FailureKind::Validation,
                "webpush: rejected",
                "device token is not a web push subscription",
            );
        };
        let endpoint = token.token.trim();
        let p256dh = p256dh.as_deref().filter(|key| !key.is_empty());
        let auth = auth.as_deref().filter(|key| !key.is_empty());
        let (false, Some(p256dh), Some(auth)) = (endpoint.is_empty(), p256dh, auth) else {
            return DeliveryOutcome::failed(
                FailureKind::Validation,
                "webpush: rejected",
                "missing subscription parameters",
            );
        };

        let payload = WebPushPayload {
            title: &message.title,
            body: &message.body,
            icon: self.config.icon.as_deref(),
            badge: self.config.badge.as_deref(),
            data: &message.data,
            require_interaction: message.require_interaction,
            tag: &message.tag,
        };
        let payload = match serde_json::to_vec(&payload) {
            Ok(payload) => payload,
            Err(err) => {
                return DeliveryOutcome::failed(
                    FailureKind::Validation,
                    "webpush: rejected",
                    err.to_string(),
                )
            }
        };

        let body = match encryption::encrypt(&payload, p256dh, auth) {
            Ok(body) => body,
            Err(err) => {
                return DeliveryOutcome::failed(
                    FailureKind::Validation,
                    "webpush: rejected",
                    err.to_string(),
                )
            }
        };

        let authorization = match self.vapid.authorization(endpoint) {
            Ok(authorization) => authorization,
            Err(err) => {
                return DeliveryOutcome::failed(
                    FailureKind::Validation,
                    "webpush: rejected",
                    err.to_string(),
                )
            }
        };

        let response = self
            .http_client
            .post(endpoint)
            .header("TTL", self.config.ttl.as_secs().to_string())
            .header("Urgency", Self::urgency(message.priority))
            .header("Topic", &message.tag)
            .header(header::CONTENT_ENCODING, "aes128gcm")
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::AUTHORIZATION, authorization)
            .body(body)
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(%err, "web push request failed");
                return DeliveryOutcome::failed(
                    FailureKind::Transient,
                    "webpush: request failed",
                    err.to_string(),
                );
            }
        };

        let status = response.status();
        if status.is_success() {
            return DeliveryOutcome::sent(format!("webpush: {status}"));
        }

        let body = response.text().await.unwrap_or_default();
        let failure_kind = match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => FailureKind::Permanent,
            _ => FailureKind::Transient,
        };
        let error_message = match body.is_empty() {
            true => format!("push service responded with {status}"),
            false => truncate_string(&body, 200),
        };

        DeliveryOutcome::failed(failure_kind, format!("webpush: {status}"), error_message)
    }
}
