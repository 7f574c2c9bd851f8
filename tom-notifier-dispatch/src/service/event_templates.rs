//!
//! Per notification type strategy table.
//! Every type shares one dispatch flow and differs only in the values below.
//!

use super::channels::truncate_string;
use crate::{
    dto::{DispatchEvent, NotificationType},
    repository::User,
};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

const PREVIEW_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the 2nd, 3rd, ... attempt, last value repeats
    pub backoff: &'static [Duration],
}

impl RetryPolicy {
    ///
    /// Delay before the attempt following `attempt` (1-based),
    /// `None` when the attempt budget is exhausted.
    ///
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }

        let index = attempt.saturating_sub(1) as usize;
        let delay = self
            .backoff
            .get(index)
            .or(self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO);

        Some(delay)
    }

    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..self
        }
    }
}

const STANDARD_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    backoff: &[
        Duration::from_secs(10),
        Duration::from_secs(30),
        Duration::from_secs(60),
    ],
};

const CALL_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    backoff: &[
        Duration::from_secs(5),
        Duration::from_secs(10),
        Duration::from_secs(15),
    ],
};

#[derive(Debug, PartialEq)]
pub struct EventTemplate {
    pub notification_type: NotificationType,
    pub priority: u8,
    pub email_template: Option<&'static str>,
    pub require_interaction: bool,
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

static CONNECTION_REQUEST: EventTemplate = EventTemplate {
    notification_type: NotificationType::ConnectionRequest,
    priority: 5,
    email_template: Some("connection_request"),
    require_interaction: false,
    retry: STANDARD_RETRY,
    timeout: Duration::from_secs(60),
};

static CONNECTION_ACCEPTED: EventTemplate = EventTemplate {
    notification_type: NotificationType::ConnectionAccepted,
    priority: 5,
    email_template: Some("connection_accepted"),
    require_interaction: false,
    retry: STANDARD_RETRY,
    timeout: Duration::from_secs(60),
};

static NEW_MESSAGE: EventTemplate = EventTemplate {
    notification_type: NotificationType::NewMessage,
    priority: 7,
    email_template: Some("new_message"),
    require_interaction: false,
    retry: STANDARD_RETRY,
    timeout: Duration::from_secs(60),
};

static INCOMING_CALL: EventTemplate = EventTemplate {
    notification_type: NotificationType::IncomingCall,
    priority: 10,
    email_template: None,
    require_interaction: true,
    retry: CALL_RETRY,
    timeout: Duration::from_secs(30),
};

static PROFILE_UPLOAD_LIKE: EventTemplate = EventTemplate {
    notification_type: NotificationType::ProfileUploadLike,
    priority: 3,
    email_template: Some("profile_upload_like"),
    require_interaction: false,
    retry: STANDARD_RETRY,
    timeout: Duration::from_secs(60),
};

pub fn template(notification_type: NotificationType) -> &'static EventTemplate {
    match notification_type {
        NotificationType::ConnectionRequest => &CONNECTION_REQUEST,
        NotificationType::ConnectionAccepted => &CONNECTION_ACCEPTED,
        NotificationType::NewMessage => &NEW_MESSAGE,
        NotificationType::IncomingCall => &INCOMING_CALL,
        NotificationType::ProfileUploadLike => &PROFILE_UPLOAD_LIKE,
    }
}

static TEMPLATES: [&EventTemplate; 5] = [
    &CONNECTION_REQUEST,
    &CONNECTION_ACCEPTED,
    &NEW_MESSAGE,
    &INCOMING_CALL,
    &PROFILE_UPLOAD_LIKE,
];

pub fn shortest_timeout() -> Duration {
    TEMPLATES
        .iter()
        .map(|template| template.timeout)
        .min()
        .unwrap_or(Duration::ZERO)
}

///
/// Every distinct retry delay in ascending order.
/// A raised attempt budget repeats the last delay, so no other delay is ever requested.
///
pub fn retry_delays() -> Vec<Duration> {
    let mut delays = TEMPLATES
        .iter()
        .flat_map(|template| template.retry.backoff.iter().copied())
        .collect::<Vec<_>>();
    delays.sort();
    delays.dedup();
    delays
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub template: &'static str,
    pub variables: Map<String, Value>,
}

///
/// Content shared by the in-app record, push messages and email.
///
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedNotification {
    pub title: String,
    pub body: String,
    pub priority: u8,
    pub action_url: Option<String>,
    /// In-app payload and push data
    pub data: Map<String, Value>,
    pub email: Option<RenderedEmail>,
}

pub fn render(
    event: &DispatchEvent,
    dispatch_id: Uuid,
    actor: &User,
    recipient: &User,
) -> RenderedNotification {
    let template = template(event.notification_type);
    let actor_name = actor.name.as_str();

    let (title, body, action_url) = match event.notification_type {
        NotificationType::ConnectionRequest => (
            "New connection request".to_string(),
            format!("{actor_name} wants to connect with you"),
            Some("/connections/requests".to_string()),
        ),
        NotificationType::ConnectionAccepted => (
            "Connection accepted".to_string(),
            format!("{actor_name} accepted your connection request"),
            Some(format!("/profile/{}", actor.id)),
        ),
        NotificationType::NewMessage => {
            let body = match event.context("preview").filter(|preview| !preview.is_empty()) {
                Some(preview) => format!(
                    "{actor_name}: {}",
                    truncate_string(preview, PREVIEW_MAX_CHARS)
                ),
                None => format!("{actor_name} sent you a message"),
            };
            let action_url = match event.context("conversation_id") {
                Some(conversation_id) => format!("/messages/{conversation_id}"),
                None => "/messages".to_string(),
            };
            ("New message".to_string(), body, Some(action_url))
        }
        NotificationType::IncomingCall => {
            let call_type = match event.context("call_type") {
                Some("video") => "video",
                _ => "audio",
            };
            (
                format!("Incoming {call_type} call"),
                format!("{actor_name} is calling you"),
                event.context("call_id").map(|call_id| format!("/calls/{call_id}")),
            )
        }
        NotificationType::ProfileUploadLike => {
            let upload_kind = event.context("upload_kind").unwrap_or("upload");
            (
                "New like".to_string(),
                format!("{actor_name} liked your {upload_kind}"),
                event
                    .context("upload_id")
                    .map(|upload_id| format!("/uploads/{upload_id}")),
            )
        }
    };

    let mut data = Map::new();
    data.insert("type".into(), event.notification_type.as_ref().into());
    data.insert("dispatch_id".into(), dispatch_id.to_string().into());
    data.insert("actor_id".into(), actor.id.into());
    data.insert("actor_name".into(), actor_name.into());
    for (key, value) in event.context.iter() {
        // free text stays out of push data, it is already part of the body
        if key != "preview" {
            data.entry(key.clone()).or_insert_with(|| value.clone().into());
        }
    }
    if let Some(action_url) = &action_url {
        data.insert("action_url".into(), action_url.clone().into());
    }

    let email = template.email_template.map(|email_template| {
        let mut variables = Map::new();
        variables.insert("recipient_name".into(), recipient.name.clone().into());
        variables.insert("actor_name".into(), actor_name.into());
        variables.insert("title".into(), title.clone().into());
        variables.insert("body".into(), body.clone().into());
        if let Some(action_url) = &action_url {
            variables.insert("action_url".into(), action_url.clone().into());
        }

        RenderedEmail {
            subject: title.clone(),
            template: email_template,
            variables,
        }
    });

    RenderedNotification {
        title,
        body,
        priority: template.priority,
        action_url,
        data,
        email,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use time::OffsetDateTime;

    fn user(id: i64, name: &str) -> User {
        User {
            id,
            name: name.to_string(),
            email: Some(format!("{}@example.com", name.to_lowercase())),
            email_verified: true,
        }
    }

    fn event(notification_type: NotificationType, context: &[(&str, &str)]) -> DispatchEvent {
        DispatchEvent {
            notification_type,
            actor_id: 1,
            recipient_id: 2,
            context: context
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            occurred_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        }
    }

    #[test]
    fn standard_retry_schedule() {
        let retry = template(NotificationType::NewMessage).retry;

        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.delay_after(1), Some(Duration::from_secs(10)));
        assert_eq!(retry.delay_after(2), Some(Duration::from_secs(30)));
        assert_eq!(retry.delay_after(3), None);
        assert_eq!(
            template(NotificationType::NewMessage).timeout,
            Duration::from_secs(60)
        );
    }

    #[test]
    fn calls_retry_faster() {
        let template = template(NotificationType::IncomingCall);

        assert_eq!(template.retry.delay_after(1), Some(Duration::from_secs(5)));
        assert_eq!(template.retry.delay_after(2), Some(Duration::from_secs(10)));
        assert_eq!(template.timeout, Duration::from_secs(30));
        assert_eq!(template.email_template, None);
    }

    #[test]
    fn raised_attempt_budget_repeats_last_delay() {
        let retry = STANDARD_RETRY.with_max_attempts(6);

        assert_eq!(retry.delay_after(3), Some(Duration::from_secs(60)));
        assert_eq!(retry.delay_after(5), Some(Duration::from_secs(60)));
        assert_eq!(retry.delay_after(6), None);
        assert_eq!(STANDARD_RETRY.with_max_attempts(0).max_attempts, 1);
    }

    #[test]
    fn shortest_timeout_is_call_timeout() {
        assert_eq!(shortest_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn retry_delays_are_distinct_and_sorted() {
        assert_eq!(
            retry_delays(),
            [5, 10, 15, 30, 60].map(Duration::from_secs).to_vec()
        );
    }

    #[test]
    fn every_type_has_template_of_its_own() {
        for notification_type in [
            NotificationType::ConnectionRequest,
            NotificationType::ConnectionAccepted,
            NotificationType::NewMessage,
            NotificationType::IncomingCall,
            NotificationType::ProfileUploadLike,
        ] {
            let template = template(notification_type);
            assert_eq!(template.notification_type, notification_type);
            assert!(template.priority <= 10);
        }
    }

    #[test]
    fn new_message_render() {
        let event = event(
            NotificationType::NewMessage,
            &[
                ("conversation_id", "9"),
                ("message_id", "15"),
                ("preview", "hello there"),
            ],
        );
        let dispatch_id = event.dispatch_id();

        let rendered = render(&event, dispatch_id, &user(1, "Ann"), &user(2, "Bob"));

        assert_eq!(rendered.title, "New message");
        assert_eq!(rendered.body, "Ann: hello there");
        assert_eq!(rendered.priority, 7);
        assert_eq!(rendered.action_url.as_deref(), Some("/messages/9"));
        assert_eq!(
            Value::Object(rendered.data),
            json!({
                "type": "new_message",
                "dispatch_id": dispatch_id.to_string(),
                "actor_id": 1,
                "actor_name": "Ann",
                "conversation_id": "9",
                "message_id": "15",
                "action_url": "/messages/9",
            })
        );

        let email = rendered.email.unwrap();
        assert_eq!(email.template, "new_message");
        assert_eq!(email.variables["recipient_name"], "Bob");
    }

    #[test]
    fn long_preview_truncated() {
        let preview = "x".repeat(300);
        let event = event(NotificationType::NewMessage, &[("preview", &preview)]);

        let rendered = render(&event, event.dispatch_id(), &user(1, "Ann"), &user(2, "Bob"));

        assert_eq!(rendered.body.chars().count(), "Ann: ".len() + PREVIEW_MAX_CHARS + 1);
        assert_eq!(rendered.action_url.as_deref(), Some("/messages"));
    }

    #[test]
    fn incoming_call_render() {
        let event = event(
            NotificationType::IncomingCall,
            &[("call_id", "55"), ("call_type", "video")],
        );

        let rendered = render(&event, event.dispatch_id(), &user(1, "Ann"), &user(2, "Bob"));

        assert_eq!(rendered.title, "Incoming video call");
        assert_eq!(rendered.body, "Ann is calling you");
        assert_eq!(rendered.priority, 10);
        assert_eq!(rendered.action_url.as_deref(), Some("/calls/55"));
        assert_eq!(rendered.email, None);
    }

    #[test]
    fn context_cannot_override_reserved_data() {
        let event = event(NotificationType::ConnectionRequest, &[("type", "spoofed")]);

        let rendered = render(&event, event.dispatch_id(), &user(1, "Ann"), &user(2, "Bob"));

        assert_eq!(rendered.data["type"], "connection_request");
        assert_eq!(rendered.body, "Ann wants to connect with you");
    }
}
