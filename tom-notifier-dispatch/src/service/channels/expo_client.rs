use super::{truncate_string, DeliveryOutcome, PushClient, PushMessage};
use crate::{dto::FailureKind, repository::DeviceToken};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{sync::LazyLock, time::Duration};

static EXPO_PUSH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Expo(nent)?PushToken\[.+\]$").expect("expo push token regex is valid")
});

///
/// Checks the token format without any network call.
///
pub fn is_valid_expo_token(token: &str) -> bool {
    EXPO_PUSH_TOKEN.is_match(token)
}

#[derive(Debug, Clone)]
pub struct ExpoClientConfig {
    /// `https://exp.host/--/api/v2/push/send`
    pub url: String,
    pub access_token: Option<String>,
    pub timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpoRequest<'a> {
    to: &'a str,
    sound: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a Map<String, Value>,
    priority: &'a str,
    channel_id: &'a str,
}

#[derive(Deserialize)]
struct ExpoResponse {
    data: ExpoTickets,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExpoTickets {
    One(ExpoTicket),
    Many(Vec<ExpoTicket>),
}

#[derive(Deserialize)]
struct ExpoTicket {
    status: String,
    id: Option<String>,
    message: Option<String>,
    details: Option<ExpoTicketDetails>,
}

#[derive(Deserialize)]
struct ExpoTicketDetails {
    error: Option<String>,
}

pub struct ExpoClient {
    config: ExpoClientConfig,
    http_client: reqwest::Client,
}

impl ExpoClient {
    pub fn new(config: ExpoClientConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn ticket_outcome(ticket: ExpoTicket) -> DeliveryOutcome {
        if ticket.status == "ok" {
            let id = ticket.id.unwrap_or_default();
            return DeliveryOutcome::sent(format!("expo: ticket {id}"));
        }

        let error = ticket.details.and_then(|details| details.error);
        let failure_kind = match error.as_deref() {
            Some("DeviceNotRegistered") => FailureKind::Permanent,
            _ => FailureKind::Transient,
        };
        let error_message = ticket
            .message
            .or(error)
            .unwrap_or_else(|| format!("ticket status {}", ticket.status));

        DeliveryOutcome::failed(
            failure_kind,
            format!("expo: ticket {}", ticket.status),
            error_message,
        )
    }
}

#[async_trait]
impl PushClient for ExpoClient {
    #[tracing::instrument(name = "Expo Client", skip_all)]
    async fn send(&self, token: &DeviceToken, message: &PushMessage) -> DeliveryOutcome {
        if !is_valid_expo_token(&token.token) {
            return DeliveryOutcome::failed(
                FailureKind::Validation,
                "expo: rejected",
                "invalid expo push token format",
            );
        }

        let request = ExpoRequest {
            to: &token.token,
            sound: "default",
            title: &message.title,
            body: &message.body,
            data: &message.data,
            priority: match message.priority >= 8 {
                true => "high",
                false => "default",
            },
            channel_id: "default",
        };

        let mut request_builder = self.http_client.post(&self.config.url).json(&request);
        if let Some(access_token) = &self.config.access_token {
            request_builder = request_builder.bearer_auth(access_token);
        }

        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(%err, "expo request failed");
                return DeliveryOutcome::failed(
                    FailureKind::Transient,
                    "expo: request failed",
                    err.to_string(),
                );
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                return DeliveryOutcome::failed(
                    FailureKind::Transient,
                    format!("expo: {status}"),
                    err.to_string(),
                )
            }
        };
        if !status.is_success() {
            return DeliveryOutcome::failed(
                FailureKind::Transient,
                format!("expo: {status}"),
                truncate_string(&body, 200),
            );
        }

        // 200 may still carry a per-message error
        let ticket = match serde_json::from_str::<ExpoResponse>(&body) {
            Ok(ExpoResponse {
                data: ExpoTickets::One(ticket),
            }) => Some(ticket),
            Ok(ExpoResponse {
                data: ExpoTickets::Many(tickets),
            }) => tickets.into_iter().next(),
            Err(_) => None,
        };

        match ticket {
            Some(ticket) => Self::ticket_outcome(ticket),
            None => DeliveryOutcome::failed(
                FailureKind::Transient,
                format!("expo: {status}"),
                format!("malformed response: {}", truncate_string(&body, 200)),
            ),
        }
    }
}
