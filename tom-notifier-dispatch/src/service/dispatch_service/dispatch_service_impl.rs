use super::{DispatchReport, DispatchService, EmailOutcome, RecordOutcome};
use crate::{
    dto::{DeliveryChannel, DispatchEvent},
    error::Error,
    repository::{
        self, DeliveryAttemptsRepository, DeviceToken,
        DeviceTokensRepository, NewDeliveryAttempt, NewNotificationRecord,
        NotificationPreferences, NotificationsRepository, PreferencesRepository, User,
        UsersRepository,
    },
    service::{
        channels::{DeliveryChannels, DeliveryOutcome, EmailMessage, PushMessage},
        event_templates::{self, RenderedNotification},
        preference_gate,
    },
};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use serde_json::{Map, Value};
use std::{sync::Arc, time::Duration};
use time::OffsetDateTime;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DispatchServiceConfig {
    /// Maximum number of tokens of one recipient sent to at once
    pub push_concurrency: usize,
}

#[derive(Clone)]
pub struct DispatchRepositories {
    pub users: Arc<dyn UsersRepository>,
    pub preferences: Arc<dyn PreferencesRepository>,
    pub device_tokens: Arc<dyn DeviceTokensRepository>,
    pub notifications: Arc<dyn NotificationsRepository>,
    pub delivery_attempts: Arc<dyn DeliveryAttemptsRepository>,
}

pub struct DispatchServiceImpl {
    config: DispatchServiceConfig,
    repositories: DispatchRepositories,
    channels: DeliveryChannels,
}

enum PushResult {
    Sent,
    Failed,
    AlreadySent,
    Skipped,
    Deferred,
}

struct AttemptContent<'a> {
    title: &'a str,
    body: &'a str,
    payload: &'a Map<String, Value>,
}

impl DispatchServiceImpl {
    pub fn new(
        config: DispatchServiceConfig,
        repositories: DispatchRepositories,
        channels: DeliveryChannels,
    ) -> Self {
        Self {
            config,
            repositories,
            channels,
        }
    }

    async fn record_notification(
        &self,
        event: &DispatchEvent,
        dispatch_id: Uuid,
        rendered: &RenderedNotification,
    ) -> RecordOutcome {
        let record = NewNotificationRecord {
            dispatch_id,
            recipient_id: event.recipient_id,
            title: rendered.title.clone(),
            message: rendered.body.clone(),
            notification_type: event.notification_type,
            sender_id: Some(event.actor_id),
            priority: rendered.priority,
            action_url: rendered.action_url.clone(),
            payload: rendered.data.clone(),
            created_at: OffsetDateTime::now_utc(),
        };

        match self.repositories.notifications.insert(record).await {
            Ok(id) => {
                tracing::info!(id = %id, "recorded notification");
                RecordOutcome::Inserted(id)
            }
            Err(repository::Error::InsertUniqueViolation) => {
                tracing::info!("notification already recorded");
                RecordOutcome::AlreadyRecorded
            }
            Err(err) => {
                tracing::error!(%err, "failed to record notification");
                RecordOutcome::Failed
            }
        }
    }

    async fn fan_out_push(
        &self,
        dispatch_id: Uuid,
        recipient_id: i64,
        preferences: &NotificationPreferences,
        message: &PushMessage,
        deadline: Instant,
        report: &mut DispatchReport,
    ) -> Result<(), repository::Error> {
        let tokens = self
            .repositories
            .device_tokens
            .find_active(recipient_id)
            .await?;
        let tokens = tokens
            .into_iter()
            .filter(|token| {
                preference_gate::is_channel_enabled(preferences, DeliveryChannel::from(&token.kind))
            })
            .collect::<Vec<_>>();
        tracing::info!(count = tokens.len(), "found push targets");

        let deliveries = tokens
            .iter()
            .map(|token| self.deliver_push(dispatch_id, recipient_id, token, message, deadline))
            .collect::<Vec<_>>();
        let results = stream::iter(deliveries)
            .buffer_unordered(self.config.push_concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut first_err = None;
        for result in results {
            match result {
                Ok(PushResult::Sent) => report.push_sent += 1,
                Ok(PushResult::Failed) => report.push_failed += 1,
                Ok(PushResult::AlreadySent) => report.push_already_sent += 1,
                Ok(PushResult::Deferred) => report.push_deferred += 1,
                Ok(PushResult::Skipped) => {}
                Err(err) => {
                    tracing::error!(%err, "push delivery failed");
                    first_err.get_or_insert(err);
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[tracing::instrument(
        name = "Push",
        skip_all,
        fields(token_id = %token._id, channel = %DeliveryChannel::from(&token.kind))
    )]
    async fn deliver_push(
        &self,
        dispatch_id: Uuid,
        recipient_id: i64,
        token: &DeviceToken,
        message: &PushMessage,
        deadline: Instant,
    ) -> Result<PushResult, repository::Error> {
        let channel = DeliveryChannel::from(&token.kind);
        let Some(client) = self.channels.push_client(channel) else {
            tracing::warn!("channel not configured, skipping token");
            return Ok(PushResult::Skipped);
        };

        // buffered sends start lazily, the deadline is checked when the send would start
        if Instant::now() >= deadline {
            tracing::warn!("dispatch deadline passed, deferring token");
            return Ok(PushResult::Deferred);
        }

        let already_sent = self
            .repositories
            .delivery_attempts
            .exists_sent(dispatch_id, channel, &token.token)
            .await?;
        if already_sent {
            tracing::info!("token already reached");
            return Ok(PushResult::AlreadySent);
        }

        let outcome = client.send(token, message).await;
        let content = AttemptContent {
            title: &message.title,
            body: &message.body,
            payload: &message.data,
        };
        self.log_attempt(
            dispatch_id,
            recipient_id,
            channel,
            token.token.clone(),
            content,
            &outcome,
        )
        .await;

        if outcome.is_sent() {
            let touch_result = self
                .repositories
                .device_tokens
                .update_last_used_at(token._id, OffsetDateTime::now_utc())
                .await;
            if let Err(err) = touch_result {
                tracing::warn!(%err, "failed to update token last_used_at");
            }

            return Ok(PushResult::Sent);
        }

        if outcome.is_permanent_failure() {
            tracing::info!("deactivating rejected token");
            if let Err(err) = self.repositories.device_tokens.deactivate(token._id).await {
                tracing::warn!(%err, "failed to deactivate token");
            }
        }

        Ok(PushResult::Failed)
    }

    #[tracing::instrument(name = "Email", skip_all)]
    async fn deliver_email(
        &self,
        dispatch_id: Uuid,
        recipient: &User,
        preferences: &NotificationPreferences,
        rendered: &RenderedNotification,
        deadline: Instant,
    ) -> Result<EmailOutcome, repository::Error> {
        if !preference_gate::is_channel_enabled(preferences, DeliveryChannel::Email) {
            tracing::debug!("email disabled by recipient");
            return Ok(EmailOutcome::Skipped);
        }
        let Some(email) = &rendered.email else {
            tracing::debug!("no email template for notification type");
            return Ok(EmailOutcome::Skipped);
        };
        let Some(address) = preference_gate::has_verified_email(recipient) else {
            tracing::debug!("recipient has no verified email");
            return Ok(EmailOutcome::Skipped);
        };
        let Some(client) = &self.channels.email else {
            tracing::warn!("email channel not configured");
            return Ok(EmailOutcome::Skipped);
        };

        if Instant::now() >= deadline {
            tracing::warn!("dispatch deadline passed, deferring email");
            return Ok(EmailOutcome::Deferred);
        }

        let already_sent = self
            .repositories
            .delivery_attempts
            .exists_sent(dispatch_id, DeliveryChannel::Email, address)
            .await?;
        if already_sent {
            tracing::info!("email already sent");
            return Ok(EmailOutcome::AlreadySent);
        }

        let message = EmailMessage {
            to: address.to_string(),
            subject: email.subject.clone(),
            template: email.template.to_string(),
            variables: email.variables.clone(),
        };
        let outcome = client.send(&message).await;
        let content = AttemptContent {
            title: &email.subject,
            body: &rendered.body,
            payload: &email.variables,
        };
        self.log_attempt(
            dispatch_id,
            recipient.id,
            DeliveryChannel::Email,
            address.to_string(),
            content,
            &outcome,
        )
        .await;

        match outcome.is_sent() {
            true => Ok(EmailOutcome::Sent),
            false => Ok(EmailOutcome::Failed),
        }
    }

    async fn log_attempt(
        &self,
        dispatch_id: Uuid,
        recipient_id: i64,
        channel: DeliveryChannel,
        target_identifier: String,
        content: AttemptContent<'_>,
        outcome: &DeliveryOutcome,
    ) {
        match outcome.is_sent() {
            true => tracing::info!(summary = %outcome.response_summary, "sent"),
            false => tracing::warn!(
                summary = %outcome.response_summary,
                error = outcome.error_message.as_deref().unwrap_or_default(),
                "send failed"
            ),
        }

        let attempt = NewDeliveryAttempt {
            dispatch_id,
            recipient_id: Some(recipient_id),
            channel,
            target_identifier,
            title: content.title.to_string(),
            body: content.body.to_string(),
            payload: content.payload.clone(),
            status: outcome.status,
            failure_kind: outcome.failure_kind,
            response_summary: outcome.response_summary.clone(),
            error_message: outcome.error_message.clone(),
            sent_at: OffsetDateTime::now_utc(),
        };

        if let Err(err) = self.repositories.delivery_attempts.insert(attempt).await {
            tracing::error!(%err, "failed to log delivery attempt");
        }
    }
}

#[async_trait]
impl DispatchService for DispatchServiceImpl {
    #[tracing::instrument(
        name = "Dispatch",
        skip_all,
        fields(
            notification_type = %event.notification_type,
            actor_id = event.actor_id,
            recipient_id = event.recipient_id,
        )
    )]
    async fn dispatch(
        &self,
        event: &DispatchEvent,
        timeout: Duration,
    ) -> Result<DispatchReport, Error> {
        let deadline = Instant::now() + timeout;
        let dispatch_id = event.dispatch_id();
        tracing::info!(%dispatch_id, "dispatching");

        let recipient = self
            .repositories
            .users
            .find(event.recipient_id)
            .await?
            .ok_or(Error::RecipientNotFound(event.recipient_id))?;
        let actor = self
            .repositories
            .users
            .find(event.actor_id)
            .await?
            .ok_or(Error::ActorNotFound(event.actor_id))?;

        let template = event_templates::template(event.notification_type);
        let rendered = event_templates::render(event, dispatch_id, &actor, &recipient);

        let mut report = DispatchReport {
            dispatch_id,
            record: self.record_notification(event, dispatch_id, &rendered).await,
            push_sent: 0,
            push_failed: 0,
            push_already_sent: 0,
            push_deferred: 0,
            email: EmailOutcome::Skipped,
        };
        let mut errors = Vec::new();

        match self.repositories.preferences.find(recipient.id).await {
            Ok(preferences) if preference_gate::is_event_enabled(&preferences, event.notification_type) => {
                let message = PushMessage {
                    title: rendered.title.clone(),
                    body: rendered.body.clone(),
                    data: rendered.data.clone(),
                    priority: rendered.priority,
                    tag: event.notification_type.to_string(),
                    require_interaction: template.require_interaction,
                };
                let push_result = self
                    .fan_out_push(
                        dispatch_id,
                        recipient.id,
                        &preferences,
                        &message,
                        deadline,
                        &mut report,
                    )
                    .await;
                if let Err(err) = push_result {
                    errors.push(err);
                }

                match self
                    .deliver_email(dispatch_id, &recipient, &preferences, &rendered, deadline)
                    .await
                {
                    Ok(email) => report.email = email,
                    Err(err) => {
                        tracing::error!(%err, "email delivery failed");
                        errors.push(err);
                    }
                }
            }
            Ok(_) => tracing::info!("notification type disabled by recipient"),
            Err(err) => {
                tracing::error!(%err, "failed to load preferences");
                errors.push(err);
            }
        }

        tracing::info!(
            push_sent = report.push_sent,
            push_failed = report.push_failed,
            push_already_sent = report.push_already_sent,
            push_deferred = report.push_deferred,
            email = ?report.email,
            "dispatched"
        );

        if let Some(err) = errors.into_iter().next() {
            return Err(Error::Database(err));
        }
        if report.push_deferred > 0 || report.email == EmailOutcome::Deferred {
            return Err(Error::Timeout(timeout));
        }

        Ok(report)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        dto::{DeliveryStatus, FailureKind, NotificationType},
        repository::{
            DeviceTokenKind, MockDeliveryAttemptsRepository, MockDeviceTokensRepository,
            MockNotificationsRepository, MockPreferencesRepository, MockUsersRepository,
        },
        service::channels::{
            EmailClient, FcmClient, FcmClientConfig, MockAccessTokenProvider, MockEmailClient,
            MockPushClient, PushClient, FCM_MAX_REQUESTS_PER_SEND,
        },
    };
    use bson::oid::ObjectId;
    use mockall::predicate::eq;
    use std::{
        collections::BTreeMap,
        sync::Mutex,
        time::Duration,
    };

    const TIMEOUT: Duration = Duration::from_secs(60);

    struct Mocks {
        users: MockUsersRepository,
        preferences: MockPreferencesRepository,
        device_tokens: MockDeviceTokensRepository,
        notifications: MockNotificationsRepository,
        delivery_attempts: MockDeliveryAttemptsRepository,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                users: MockUsersRepository::new(),
                preferences: MockPreferencesRepository::new(),
                device_tokens: MockDeviceTokensRepository::new(),
                notifications: MockNotificationsRepository::new(),
                delivery_attempts: MockDeliveryAttemptsRepository::new(),
            }
        }

        /// Ann (1) notifies Bob (2) who has verified email
        fn with_users(mut self) -> Self {
            self.users.expect_find().returning(|id| {
                Ok(match id {
                    1 => Some(user(1, "Ann")),
                    2 => Some(user(2, "Bob")),
                    _ => None,
                })
            });
            self
        }

        fn with_preferences(mut self, settings: &[(&str, bool)]) -> Self {
            let preferences = NotificationPreferences {
                settings: settings
                    .iter()
                    .map(|(key, value)| (key.to_string(), *value))
                    .collect(),
            };
            self.preferences
                .expect_find()
                .with(eq(2))
                .return_once(move |_| Ok(preferences));
            self
        }

        fn with_tokens(mut self, tokens: Vec<DeviceToken>) -> Self {
            self.device_tokens
                .expect_find_active()
                .with(eq(2))
                .return_once(move |_| Ok(tokens));
            self
        }

        fn with_record_inserted(mut self) -> Self {
            self.notifications
                .expect_insert()
                .times(1)
                .returning(|_| Ok(ObjectId::new()));
            self
        }

        fn with_nothing_sent_before(mut self) -> Self {
            self.delivery_attempts
                .expect_exists_sent()
                .returning(|_, _, _| Ok(false));
            self
        }

        fn service(self, channels: DeliveryChannels) -> DispatchServiceImpl {
            self.service_with_concurrency(channels, 4)
        }

        fn service_with_concurrency(
            self,
            channels: DeliveryChannels,
            push_concurrency: usize,
        ) -> DispatchServiceImpl {
            DispatchServiceImpl::new(
                DispatchServiceConfig { push_concurrency },
                DispatchRepositories {
                    users: Arc::new(self.users),
                    preferences: Arc::new(self.preferences),
                    device_tokens: Arc::new(self.device_tokens),
                    notifications: Arc::new(self.notifications),
                    delivery_attempts: Arc::new(self.delivery_attempts),
                },
                channels,
            )
        }
    }

    fn user(id: i64, name: &str) -> User {
        User {
            id,
            name: name.to_string(),
            email: Some(format!("{}@example.com", name.to_lowercase())),
            email_verified: true,
        }
    }

    fn token(token: &str, kind: DeviceTokenKind) -> DeviceToken {
        DeviceToken {
            _id: ObjectId::new(),
            owner_id: 2,
            token: token.to_string(),
            kind,
            is_active: true,
            last_used_at: None,
        }
    }

    fn event(notification_type: NotificationType) -> DispatchEvent {
        DispatchEvent {
            notification_type,
            actor_id: 1,
            recipient_id: 2,
            context: BTreeMap::from([("request_id".to_string(), "15".to_string())]),
            occurred_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        }
    }

    fn push_client(outcome: DeliveryOutcome, times: usize) -> Arc<dyn PushClient> {
        let mut client = MockPushClient::new();
        client
            .expect_send()
            .times(times)
            .returning(move |_, _| outcome.clone());
        Arc::new(client)
    }

    /// Spends the given delays one after another as sequential requests would
    struct SlowPushClient {
        delays: Vec<Duration>,
        outcome: DeliveryOutcome,
    }

    #[async_trait]
    impl PushClient for SlowPushClient {
        async fn send(&self, _token: &DeviceToken, _message: &PushMessage) -> DeliveryOutcome {
            for delay in self.delays.iter() {
                tokio::time::sleep(*delay).await;
            }
            self.outcome.clone()
        }
    }

    fn email_client(times: usize) -> Arc<dyn EmailClient> {
        let mut client = MockEmailClient::new();
        client
            .expect_send()
            .times(times)
            .returning(|_| DeliveryOutcome::sent("email: 202 Accepted"));
        Arc::new(client)
    }

    #[tokio::test]
    async fn missing_recipient_has_no_side_effects() {
        let mut mocks = Mocks::new();
        mocks.users.expect_find().returning(|_| Ok(None));
        mocks.notifications.expect_insert().never();
        mocks.delivery_attempts.expect_insert().never();
        let service = mocks.service(DeliveryChannels {
            fcm: Some(push_client(DeliveryOutcome::sent("fcm v1: id"), 0)),
            email: Some(email_client(0)),
            ..Default::default()
        });

        let result = service.dispatch(&event(NotificationType::ConnectionRequest), TIMEOUT).await;

        assert!(matches!(result, Err(Error::RecipientNotFound(2))));
    }

    #[tokio::test]
    async fn missing_actor_has_no_side_effects() {
        let mut mocks = Mocks::new();
        mocks.users.expect_find().returning(|id| {
            Ok(match id {
                2 => Some(user(2, "Bob")),
                _ => None,
            })
        });
        mocks.notifications.expect_insert().never();
        mocks.delivery_attempts.expect_insert().never();
        let service = mocks.service(DeliveryChannels::default());

        let result = service.dispatch(&event(NotificationType::ConnectionRequest), TIMEOUT).await;

        assert!(matches!(result, Err(Error::ActorNotFound(1))));
    }

    #[tokio::test]
    async fn connection_request_reaches_every_channel() {
        let mut mocks = Mocks::new()
            .with_users()
            .with_preferences(&[])
            .with_tokens(vec![token("fcm-token", DeviceTokenKind::Fcm)])
            .with_nothing_sent_before();
        mocks
            .notifications
            .expect_insert()
            .withf(|record| {
                record.notification_type == NotificationType::ConnectionRequest
                    && record.recipient_id == 2
                    && record.sender_id == Some(1)
                    && record.message == "Ann wants to connect with you"
            })
            .times(1)
            .returning(|_| Ok(ObjectId::new()));
        mocks
            .delivery_attempts
            .expect_insert()
            .withf(|attempt| {
                attempt.channel == DeliveryChannel::Fcm
                    && attempt.target_identifier == "fcm-token"
                    && attempt.status == DeliveryStatus::Sent
                    && attempt.recipient_id == Some(2)
            })
            .times(1)
            .returning(|_| Ok(ObjectId::new()));
        mocks
            .delivery_attempts
            .expect_insert()
            .withf(|attempt| {
                attempt.channel == DeliveryChannel::Email
                    && attempt.target_identifier == "bob@example.com"
                    && attempt.status == DeliveryStatus::Sent
            })
            .times(1)
            .returning(|_| Ok(ObjectId::new()));
        mocks
            .device_tokens
            .expect_update_last_used_at()
            .times(1)
            .returning(|_, _| Ok(()));
        let service = mocks.service(DeliveryChannels {
            fcm: Some(push_client(DeliveryOutcome::sent("fcm v1: projects/p/messages/1"), 1)),
            email: Some(email_client(1)),
            ..Default::default()
        });

        let report = service
            .dispatch(&event(NotificationType::ConnectionRequest), TIMEOUT)
            .await
            .unwrap();

        assert!(matches!(report.record, RecordOutcome::Inserted(_)));
        assert_eq!(report.push_sent, 1);
        assert_eq!(report.push_failed, 0);
        assert_eq!(report.email, EmailOutcome::Sent);
    }

    #[tokio::test]
    async fn fcm_legacy_fallback_logs_single_sent_attempt() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/projects/project/messages:send")
            .with_status(503)
            .create_async()
            .await;
        server
            .mock("POST", "/fcm/send")
            .with_status(200)
            .with_body(r#"{"success":1,"failure":0,"results":[{"message_id":"0:789"}]}"#)
            .create_async()
            .await;
        let mut provider = MockAccessTokenProvider::new();
        provider
            .expect_access_token()
            .returning(|| Ok("ya29.token".to_string()));
        let fcm_client = FcmClient::new(
            FcmClientConfig {
                project_id: Some("project".to_string()),
                legacy_server_key: Some("server-key".to_string()),
                v1_base_url: server.url(),
                legacy_url: format!("{}/fcm/send", server.url()),
                timeout: Duration::from_secs(2),
            },
            Some(Arc::new(provider)),
        )
        .unwrap();

        let mut mocks = Mocks::new()
            .with_users()
            .with_preferences(&[("email_notifications", false)])
            .with_tokens(vec![token("fcm-token", DeviceTokenKind::Fcm)])
            .with_record_inserted()
            .with_nothing_sent_before();
        mocks
            .delivery_attempts
            .expect_insert()
            .withf(|attempt| {
                attempt.channel == DeliveryChannel::Fcm
                    && attempt.status == DeliveryStatus::Sent
                    && attempt.response_summary == "fcm legacy: 0:789"
            })
            .times(1)
            .returning(|_| Ok(ObjectId::new()));
        mocks
            .device_tokens
            .expect_update_last_used_at()
            .times(1)
            .returning(|_, _| Ok(()));
        let service = mocks.service(DeliveryChannels {
            fcm: Some(Arc::new(fcm_client)),
            email: Some(email_client(0)),
            ..Default::default()
        });

        let report = service
            .dispatch(&event(NotificationType::ConnectionRequest), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(report.push_sent, 1);
        assert_eq!(report.email, EmailOutcome::Skipped);
    }

    #[tokio::test]
    async fn no_tokens_no_push_attempts() {
        let mut mocks = Mocks::new()
            .with_users()
            .with_preferences(&[("email_notifications", false)])
            .with_tokens(vec![])
            .with_record_inserted();
        mocks.delivery_attempts.expect_insert().never();
        let service = mocks.service(DeliveryChannels {
            fcm: Some(push_client(DeliveryOutcome::sent("fcm v1: id"), 0)),
            email: Some(email_client(0)),
            ..Default::default()
        });

        let report = service
            .dispatch(&event(NotificationType::NewMessage), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(report.push_sent + report.push_failed, 0);
        assert_eq!(report.email, EmailOutcome::Skipped);
    }

    #[tokio::test]
    async fn token_failure_does_not_stop_other_tokens() {
        let rejected = token("ExpoPushToken[gone]", DeviceTokenKind::Expo);
        let rejected_id = rejected._id;
        let mut mocks = Mocks::new()
            .with_users()
            .with_preferences(&[("email_notifications", false)])
            .with_tokens(vec![rejected, token("fcm-token", DeviceTokenKind::Fcm)])
            .with_record_inserted()
            .with_nothing_sent_before();
        mocks
            .delivery_attempts
            .expect_insert()
            .withf(|attempt| {
                attempt.channel == DeliveryChannel::Expo
                    && attempt.status == DeliveryStatus::Failed
                    && attempt.failure_kind == Some(FailureKind::Permanent)
                    && attempt.error_message.is_some()
            })
            .times(1)
            .returning(|_| Ok(ObjectId::new()));
        mocks
            .delivery_attempts
            .expect_insert()
            .withf(|attempt| {
                attempt.channel == DeliveryChannel::Fcm && attempt.status == DeliveryStatus::Sent
            })
            .times(1)
            .returning(|_| Ok(ObjectId::new()));
        mocks
            .device_tokens
            .expect_deactivate()
            .with(eq(rejected_id))
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .device_tokens
            .expect_update_last_used_at()
            .times(1)
            .returning(|_, _| Ok(()));
        let service = mocks.service(DeliveryChannels {
            fcm: Some(push_client(DeliveryOutcome::sent("fcm v1: id"), 1)),
            expo: Some(push_client(
                DeliveryOutcome::failed(
                    FailureKind::Permanent,
                    "expo: ticket error",
                    "DeviceNotRegistered",
                ),
                1,
            )),
            ..Default::default()
        });

        let report = service
            .dispatch(&event(NotificationType::NewMessage), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(report.push_sent, 1);
        assert_eq!(report.push_failed, 1);
    }

    #[tokio::test]
    async fn transient_failure_keeps_token_active() {
        let mut mocks = Mocks::new()
            .with_users()
            .with_preferences(&[("email_notifications", false)])
            .with_tokens(vec![token("fcm-token", DeviceTokenKind::Fcm)])
            .with_record_inserted()
            .with_nothing_sent_before();
        mocks
            .delivery_attempts
            .expect_insert()
            .times(1)
            .returning(|_| Ok(ObjectId::new()));
        mocks.device_tokens.expect_deactivate().never();
        mocks.device_tokens.expect_update_last_used_at().never();
        let service = mocks.service(DeliveryChannels {
            fcm: Some(push_client(
                DeliveryOutcome::failed(FailureKind::Transient, "fcm legacy: 500", "boom"),
                1,
            )),
            ..Default::default()
        });

        let report = service
            .dispatch(&event(NotificationType::NewMessage), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(report.push_failed, 1);
    }

    #[tokio::test]
    async fn email_disabled_no_email_attempt() {
        let mut mocks = Mocks::new()
            .with_users()
            .with_preferences(&[("email_notifications", false)])
            .with_tokens(vec![token("fcm-token", DeviceTokenKind::Fcm)])
            .with_record_inserted()
            .with_nothing_sent_before();
        mocks
            .delivery_attempts
            .expect_insert()
            .withf(|attempt| attempt.channel == DeliveryChannel::Email)
            .never();
        mocks
            .delivery_attempts
            .expect_insert()
            .times(1)
            .returning(|_| Ok(ObjectId::new()));
        mocks
            .device_tokens
            .expect_update_last_used_at()
            .returning(|_, _| Ok(()));
        let service = mocks.service(DeliveryChannels {
            fcm: Some(push_client(DeliveryOutcome::sent("fcm v1: id"), 1)),
            email: Some(email_client(0)),
            ..Default::default()
        });

        let report = service
            .dispatch(&event(NotificationType::ConnectionAccepted), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(report.email, EmailOutcome::Skipped);
    }

    #[tokio::test]
    async fn push_disabled_still_records_and_emails() {
        let mut mocks = Mocks::new()
            .with_users()
            .with_preferences(&[("push_notifications", false)])
            .with_tokens(vec![token("fcm-token", DeviceTokenKind::Fcm)])
            .with_record_inserted()
            .with_nothing_sent_before();
        mocks
            .delivery_attempts
            .expect_insert()
            .withf(|attempt| attempt.channel == DeliveryChannel::Email)
            .times(1)
            .returning(|_| Ok(ObjectId::new()));
        let service = mocks.service(DeliveryChannels {
            fcm: Some(push_client(DeliveryOutcome::sent("fcm v1: id"), 0)),
            email: Some(email_client(1)),
            ..Default::default()
        });

        let report = service
            .dispatch(&event(NotificationType::ConnectionAccepted), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(report.push_sent, 0);
        assert_eq!(report.email, EmailOutcome::Sent);
    }

    #[tokio::test]
    async fn disabled_notification_type_only_records() {
        let mut mocks = Mocks::new()
            .with_users()
            .with_preferences(&[("profile_upload_like", false)])
            .with_record_inserted();
        mocks.device_tokens.expect_find_active().never();
        mocks.delivery_attempts.expect_insert().never();
        let service = mocks.service(DeliveryChannels {
            email: Some(email_client(0)),
            ..Default::default()
        });

        let report = service
            .dispatch(&event(NotificationType::ProfileUploadLike), TIMEOUT)
            .await
            .unwrap();

        assert!(matches!(report.record, RecordOutcome::Inserted(_)));
        assert_eq!(report.email, EmailOutcome::Skipped);
    }

    #[tokio::test]
    async fn incoming_call_sends_no_email() {
        let mut mocks = Mocks::new()
            .with_users()
            .with_preferences(&[])
            .with_tokens(vec![])
            .with_record_inserted();
        mocks.delivery_attempts.expect_insert().never();
        let service = mocks.service(DeliveryChannels {
            email: Some(email_client(0)),
            ..Default::default()
        });

        let report = service
            .dispatch(&event(NotificationType::IncomingCall), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(report.email, EmailOutcome::Skipped);
    }

    #[tokio::test]
    async fn retry_skips_targets_already_reached() {
        let mut mocks = Mocks::new()
            .with_users()
            .with_preferences(&[])
            .with_tokens(vec![token("fcm-token", DeviceTokenKind::Fcm)]);
        mocks
            .notifications
            .expect_insert()
            .times(1)
            .returning(|_| Err(repository::Error::InsertUniqueViolation));
        mocks
            .delivery_attempts
            .expect_exists_sent()
            .returning(|_, _, _| Ok(true));
        mocks.delivery_attempts.expect_insert().never();
        let service = mocks.service(DeliveryChannels {
            fcm: Some(push_client(DeliveryOutcome::sent("fcm v1: id"), 0)),
            email: Some(email_client(0)),
            ..Default::default()
        });

        let report = service
            .dispatch(&event(NotificationType::ConnectionRequest), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(report.record, RecordOutcome::AlreadyRecorded);
        assert_eq!(report.push_already_sent, 1);
        assert_eq!(report.email, EmailOutcome::AlreadySent);
    }

    #[tokio::test]
    async fn record_failure_does_not_stop_delivery() {
        let mut mocks = Mocks::new()
            .with_users()
            .with_preferences(&[])
            .with_tokens(vec![])
            .with_nothing_sent_before();
        mocks
            .notifications
            .expect_insert()
            .returning(|_| Err(repository::Error::NoDocumentUpdated));
        mocks
            .delivery_attempts
            .expect_insert()
            .times(1)
            .returning(|_| Ok(ObjectId::new()));
        let service = mocks.service(DeliveryChannels {
            email: Some(email_client(1)),
            ..Default::default()
        });

        let report = service
            .dispatch(&event(NotificationType::NewMessage), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(report.record, RecordOutcome::Failed);
        assert_eq!(report.email, EmailOutcome::Sent);
    }

    #[tokio::test]
    async fn token_lookup_failure_is_returned_after_email() {
        let mut mocks = Mocks::new()
            .with_users()
            .with_preferences(&[])
            .with_record_inserted()
            .with_nothing_sent_before();
        mocks
            .device_tokens
            .expect_find_active()
            .returning(|_| Err(repository::Error::NoDocumentUpdated));
        mocks
            .delivery_attempts
            .expect_insert()
            .times(1)
            .returning(|_| Ok(ObjectId::new()));
        let service = mocks.service(DeliveryChannels {
            email: Some(email_client(1)),
            ..Default::default()
        });

        let result = service.dispatch(&event(NotificationType::NewMessage), TIMEOUT).await;

        assert!(matches!(result, Err(Error::Database(_))));
    }

    #[tokio::test]
    async fn unconfigured_channel_is_skipped() {
        let mut mocks = Mocks::new()
            .with_users()
            .with_preferences(&[("email_notifications", false)])
            .with_tokens(vec![token(
                "https://push.example.com/1",
                DeviceTokenKind::WebPush {
                    p256dh: Some("key".to_string()),
                    auth: Some("auth".to_string()),
                },
            )])
            .with_record_inserted();
        mocks.delivery_attempts.expect_exists_sent().never();
        mocks.delivery_attempts.expect_insert().never();
        let service = mocks.service(DeliveryChannels::default());

        let report = service
            .dispatch(&event(NotificationType::NewMessage), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(report.push_sent + report.push_failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fcm_v1_timeout_then_legacy_is_logged_within_call_deadline() {
        let call_timeout = Duration::from_secs(30);
        let http_timeout = call_timeout / FCM_MAX_REQUESTS_PER_SEND;
        let mut mocks = Mocks::new()
            .with_users()
            .with_preferences(&[])
            .with_tokens(vec![token("fcm-token", DeviceTokenKind::Fcm)])
            .with_record_inserted()
            .with_nothing_sent_before();
        mocks
            .delivery_attempts
            .expect_insert()
            .withf(|attempt| {
                attempt.channel == DeliveryChannel::Fcm
                    && attempt.status == DeliveryStatus::Sent
                    && attempt.response_summary == "fcm legacy: 0:789"
            })
            .times(1)
            .returning(|_| Ok(ObjectId::new()));
        mocks
            .device_tokens
            .expect_update_last_used_at()
            .times(1)
            .returning(|_, _| Ok(()));
        // slow token exchange, v1 request timing out, legacy answering just in time
        let service = mocks.service(DeliveryChannels {
            fcm: Some(Arc::new(SlowPushClient {
                delays: vec![
                    http_timeout - Duration::from_millis(1),
                    http_timeout,
                    http_timeout - Duration::from_millis(1),
                ],
                outcome: DeliveryOutcome::sent("fcm legacy: 0:789"),
            })),
            ..Default::default()
        });
        let started_at = Instant::now();

        let report = service
            .dispatch(&event(NotificationType::IncomingCall), call_timeout)
            .await
            .unwrap();

        assert!(started_at.elapsed() < call_timeout);
        assert_eq!(report.push_sent, 1);
        assert_eq!(report.push_deferred, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn send_in_flight_at_deadline_finishes_and_rest_is_deferred() {
        let mut mocks = Mocks::new()
            .with_users()
            .with_preferences(&[])
            .with_tokens(vec![
                token("fcm-token-1", DeviceTokenKind::Fcm),
                token("fcm-token-2", DeviceTokenKind::Fcm),
            ])
            .with_record_inserted()
            .with_nothing_sent_before();
        mocks
            .delivery_attempts
            .expect_insert()
            .withf(|attempt| {
                attempt.target_identifier == "fcm-token-1"
                    && attempt.status == DeliveryStatus::Sent
            })
            .times(1)
            .returning(|_| Ok(ObjectId::new()));
        mocks
            .device_tokens
            .expect_update_last_used_at()
            .times(1)
            .returning(|_, _| Ok(()));
        let service = mocks.service_with_concurrency(
            DeliveryChannels {
                fcm: Some(Arc::new(SlowPushClient {
                    delays: vec![Duration::from_secs(40)],
                    outcome: DeliveryOutcome::sent("fcm v1: projects/p/messages/1"),
                })),
                ..Default::default()
            },
            1,
        );

        let result = service
            .dispatch(
                &event(NotificationType::IncomingCall),
                Duration::from_secs(30),
            )
            .await;

        assert!(matches!(result, Err(Error::Timeout(timeout)) if timeout == Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn repeated_event_with_equal_content_is_delivered_again() {
        let dispatch_ids = Arc::new(Mutex::new(Vec::new()));
        let recorded_ids = dispatch_ids.clone();
        let mut mocks = Mocks::new().with_users().with_nothing_sent_before();
        mocks.preferences.expect_find().returning(|_| {
            Ok(NotificationPreferences {
                settings: Default::default(),
            })
        });
        mocks
            .device_tokens
            .expect_find_active()
            .returning(|_| Ok(vec![]));
        mocks
            .notifications
            .expect_insert()
            .times(2)
            .returning(move |record| {
                recorded_ids.lock().unwrap().push(record.dispatch_id);
                Ok(ObjectId::new())
            });
        mocks
            .delivery_attempts
            .expect_insert()
            .withf(|attempt| attempt.channel == DeliveryChannel::Email)
            .times(2)
            .returning(|_| Ok(ObjectId::new()));
        let service = mocks.service(DeliveryChannels {
            email: Some(email_client(2)),
            ..Default::default()
        });
        let first_like = event(NotificationType::ProfileUploadLike);
        let mut second_like = first_like.clone();
        second_like.occurred_at += Duration::from_secs(120);

        let first = service.dispatch(&first_like, TIMEOUT).await.unwrap();
        let second = service.dispatch(&second_like, TIMEOUT).await.unwrap();

        assert!(matches!(first.record, RecordOutcome::Inserted(_)));
        assert!(matches!(second.record, RecordOutcome::Inserted(_)));
        assert_eq!(first.email, EmailOutcome::Sent);
        assert_eq!(second.email, EmailOutcome::Sent);
        let dispatch_ids = dispatch_ids.lock().unwrap();
        assert_ne!(dispatch_ids[0], dispatch_ids[1]);
    }

    #[tokio::test]
    async fn sent_check_uses_full_endpoint() {
        let prefix = format!("https://push.example.com/{}", "a".repeat(300));
        let first_endpoint = format!("{prefix}/1");
        let second_endpoint = format!("{prefix}/2");
        let web_push = |endpoint: &str| {
            token(
                endpoint,
                DeviceTokenKind::WebPush {
                    p256dh: Some("key".to_string()),
                    auth: Some("auth".to_string()),
                },
            )
        };
        let mut mocks = Mocks::new()
            .with_users()
            .with_preferences(&[("email_notifications", false)])
            .with_tokens(vec![web_push(&first_endpoint), web_push(&second_endpoint)])
            .with_record_inserted();
        let sent_endpoint = first_endpoint.clone();
        mocks
            .delivery_attempts
            .expect_exists_sent()
            .returning(move |_, _, target| Ok(target == sent_endpoint));
        let unsent_endpoint = second_endpoint.clone();
        mocks
            .delivery_attempts
            .expect_insert()
            .withf(move |attempt| attempt.target_identifier == unsent_endpoint)
            .times(1)
            .returning(|_| Ok(ObjectId::new()));
        mocks
            .device_tokens
            .expect_update_last_used_at()
            .times(1)
            .returning(|_, _| Ok(()));
        let service = mocks.service(DeliveryChannels {
            web_push: Some(push_client(DeliveryOutcome::sent("web push: 201 Created"), 1)),
            ..Default::default()
        });

        let report = service
            .dispatch(&event(NotificationType::NewMessage), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(report.push_already_sent, 1);
        assert_eq!(report.push_sent, 1);
    }
}
