use super::ApplicationEnv;
use crate::{
    repository::{
        DeliveryAttemptsRepositoryImpl, DeviceTokensRepositoryImpl, NotificationsRepositoryImpl,
        PreferencesRepositoryImpl, UsersRepositoryImpl,
    },
    service::{
        channels::{
            AccessTokenProvider, DeliveryChannels, ExpoClient, ExpoClientConfig, FcmClient,
            FcmClientConfig, HttpEmailClient, HttpEmailClientConfig, ServiceAccountKey,
            ServiceAccountTokenProvider, WebPushClient, WebPushClientConfig,
            FCM_MAX_REQUESTS_PER_SEND,
        },
        dispatch_consumer_service::{
            DispatchConsumerService, DispatchQueueConfig, RabbitmqDispatchJobPublisher,
        },
        dispatch_job_service::{
            DispatchJobServiceConfig, DispatchJobServiceImpl, LoggingDispatchFailureHandler,
        },
        dispatch_service::{DispatchRepositories, DispatchServiceConfig, DispatchServiceImpl},
        event_templates,
    },
};
use amqprs::connection::OpenConnectionArguments;
use anyhow::Context;
use mongodb::{options::ClientOptions, Client};
use rabbitmq_client::{RabbitmqConnection, RabbitmqConnectionConfig};
use std::{sync::Arc, time::Duration};

pub struct ApplicationStateToClose {
    pub db_client: Client,
    pub rabbitmq_connection: RabbitmqConnection,
    pub dispatch_job_publisher: Arc<RabbitmqDispatchJobPublisher>,
    pub dispatch_consumer_service: DispatchConsumerService,
}

pub async fn create_state(env: &ApplicationEnv) -> anyhow::Result<ApplicationStateToClose> {
    tracing::info!("connecting to database");
    let db_client_options = ClientOptions::parse(&env.db_connection_string).await?;
    let db_client = Client::with_options(db_client_options)?;
    let db = db_client.database(&env.db_name);

    tracing::info!("creating repositories");
    let repositories = DispatchRepositories {
        users: Arc::new(UsersRepositoryImpl::new(db.clone())),
        preferences: Arc::new(PreferencesRepositoryImpl::new(db.clone())),
        device_tokens: Arc::new(DeviceTokensRepositoryImpl::new(db.clone()).await?),
        notifications: Arc::new(NotificationsRepositoryImpl::new(db.clone()).await?),
        delivery_attempts: Arc::new(DeliveryAttemptsRepositoryImpl::new(db).await?),
    };

    tracing::info!("creating delivery channels");
    let channels = create_channels(env)?;
    tracing::info!(configured = ?channels.configured(), "delivery channels created");

    tracing::info!("creating services");
    let config = DispatchServiceConfig {
        push_concurrency: env.push_concurrency,
    };
    let dispatch_service = DispatchServiceImpl::new(config, repositories, channels);
    let dispatch_service = Arc::new(dispatch_service);

    let config = DispatchJobServiceConfig {
        max_attempts: env.max_attempts,
    };
    let dispatch_job_service = DispatchJobServiceImpl::new(
        config,
        dispatch_service,
        Arc::new(LoggingDispatchFailureHandler),
    );
    let dispatch_job_service = Arc::new(dispatch_job_service);

    let config = RabbitmqConnectionConfig {
        retry_interval: env.rabbitmq_retry_interval,
    };
    let open_connection_args =
        OpenConnectionArguments::try_from(env.rabbitmq_connection_string.as_str())?;
    let rabbitmq_connection = RabbitmqConnection::new(config, open_connection_args).await?;

    let queue_config = DispatchQueueConfig {
        exchange: env.rabbitmq_dispatch_exchange_name.clone(),
        queue: env.rabbitmq_dispatch_queue_name.clone(),
        routing_key: env.rabbitmq_dispatch_routing_key.clone(),
        prefetch_count: env.rabbitmq_prefetch_count,
    };
    let dispatch_job_publisher = RabbitmqDispatchJobPublisher::new(
        &queue_config,
        rabbitmq_connection.clone(),
        &event_templates::retry_delays(),
    )
    .await?;
    let dispatch_job_publisher = Arc::new(dispatch_job_publisher);

    let dispatch_consumer_service = DispatchConsumerService::new(
        &queue_config,
        rabbitmq_connection.clone(),
        dispatch_job_service,
        dispatch_job_publisher.clone(),
    )
    .await?;

    Ok(ApplicationStateToClose {
        db_client,
        rabbitmq_connection,
        dispatch_job_publisher,
        dispatch_consumer_service,
    })
}

///
/// Timeout of one HTTP request such that the slowest send (FCM token exchange,
/// v1 request and legacy fallback) started at once still ends within every dispatch timeout.
///
fn bounded_http_timeout(requested: Duration) -> Duration {
    let bound = event_templates::shortest_timeout() / FCM_MAX_REQUESTS_PER_SEND;
    if requested > bound {
        tracing::warn!(?requested, ?bound, "http timeout too long, lowering");
        return bound;
    }

    requested
}

fn create_channels(env: &ApplicationEnv) -> anyhow::Result<DeliveryChannels> {
    let mut channels = DeliveryChannels::default();
    let http_timeout = bounded_http_timeout(env.http_timeout);

    let service_account_key = match &env.fcm_service_account_file {
        Some(path) => {
            let key = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read service account file {path}"))?;
            let key = serde_json::from_str::<ServiceAccountKey>(&key)
                .with_context(|| format!("invalid service account file {path}"))?;
            Some(key)
        }
        None => None,
    };
    let fcm_project_id = env.fcm_project_id.clone().or_else(|| {
        service_account_key
            .as_ref()
            .and_then(|key| key.project_id.clone())
    });
    if service_account_key.is_some() || env.fcm_legacy_server_key.is_some() {
        let access_token_provider = match service_account_key {
            Some(key) => {
                let provider = ServiceAccountTokenProvider::new(key, http_timeout)?;
                Some(Arc::new(provider) as Arc<dyn AccessTokenProvider>)
            }
            None => None,
        };
        let config = FcmClientConfig {
            project_id: fcm_project_id,
            legacy_server_key: env.fcm_legacy_server_key.clone(),
            v1_base_url: env.fcm_v1_base_url.clone(),
            legacy_url: env.fcm_legacy_url.clone(),
            timeout: http_timeout,
        };
        channels.fcm = Some(Arc::new(FcmClient::new(config, access_token_provider)?));
    }

    let config = ExpoClientConfig {
        url: env.expo_url.clone(),
        access_token: env.expo_access_token.clone(),
        timeout: http_timeout,
    };
    channels.expo = Some(Arc::new(ExpoClient::new(config)?));

    if let (Some(vapid_public_key), Some(vapid_private_key), Some(subject)) = (
        &env.web_push_vapid_public_key,
        &env.web_push_vapid_private_key,
        &env.web_push_vapid_subject,
    ) {
        let config = WebPushClientConfig {
            vapid_public_key: vapid_public_key.clone(),
            vapid_private_key: vapid_private_key.clone(),
            subject: subject.clone(),
            icon: env.web_push_icon.clone(),
            badge: env.web_push_badge.clone(),
            ttl: env.web_push_ttl,
            timeout: http_timeout,
        };
        channels.web_push = Some(Arc::new(WebPushClient::new(config)?));
    }

    if let (Some(url), Some(api_key), Some(sender)) =
        (&env.email_api_url, &env.email_api_key, &env.email_sender)
    {
        let config = HttpEmailClientConfig {
            url: url.clone(),
            api_key: api_key.clone(),
            sender: sender.clone(),
            timeout: http_timeout,
        };
        channels.email = Some(Arc::new(HttpEmailClient::new(config)?));
    }

    Ok(channels)
}
