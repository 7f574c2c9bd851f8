use anyhow::anyhow;
use std::{str::FromStr, time::Duration};

pub struct ApplicationEnv {
    pub log_directory: String,
    pub log_filename: String,

    pub db_connection_string: String,
    pub db_name: String,

    pub rabbitmq_connection_string: String,
    pub rabbitmq_retry_interval: Duration,
    pub rabbitmq_dispatch_exchange_name: String,
    pub rabbitmq_dispatch_queue_name: String,
    pub rabbitmq_dispatch_routing_key: String,
    pub rabbitmq_prefetch_count: u16,

    pub fcm_project_id: Option<String>,
    /// Path to the Google service account JSON file
    pub fcm_service_account_file: Option<String>,
    pub fcm_legacy_server_key: Option<String>,
    pub fcm_v1_base_url: String,
    pub fcm_legacy_url: String,

    pub expo_url: String,
    pub expo_access_token: Option<String>,

    pub web_push_vapid_public_key: Option<String>,
    pub web_push_vapid_private_key: Option<String>,
    pub web_push_vapid_subject: Option<String>,
    pub web_push_icon: Option<String>,
    pub web_push_badge: Option<String>,
    pub web_push_ttl: Duration,

    pub email_api_url: Option<String>,
    pub email_api_key: Option<String>,
    pub email_sender: Option<String>,

    /// Timeout of a single HTTP request, bounded by the shortest dispatch timeout
    pub http_timeout: Duration,
    pub push_concurrency: usize,
    pub max_attempts: Option<u32>,
}

impl ApplicationEnv {
    pub fn parse() -> anyhow::Result<Self> {
        let log_directory = Self::env_var("TOM_NOTIFIER_DISPATCH_LOG_DIRECTORY")?;
        let log_filename = Self::env_var("TOM_NOTIFIER_DISPATCH_LOG_FILENAME")?;
        let db_connection_string = Self::env_var("TOM_NOTIFIER_DISPATCH_DB_CONNECTION_STRING")?;
        let db_name = Self::env_var("TOM_NOTIFIER_DISPATCH_DB_NAME")?;
        let rabbitmq_connection_string =
            Self::env_var("TOM_NOTIFIER_DISPATCH_RABBITMQ_CONNECTION_STRING")?;
        let rabbitmq_retry_interval =
            Self::env_var("TOM_NOTIFIER_DISPATCH_RABBITMQ_RETRY_INTERVAL")?.parse()?;
        let rabbitmq_retry_interval = Duration::from_secs(rabbitmq_retry_interval);
        let rabbitmq_dispatch_exchange_name =
            Self::env_var("TOM_NOTIFIER_DISPATCH_RABBITMQ_DISPATCH_EXCHANGE_NAME")?;
        let rabbitmq_dispatch_queue_name =
            Self::env_var("TOM_NOTIFIER_DISPATCH_RABBITMQ_DISPATCH_QUEUE_NAME")?;
        let rabbitmq_dispatch_routing_key =
            Self::env_var("TOM_NOTIFIER_DISPATCH_RABBITMQ_DISPATCH_ROUTING_KEY")?;
        let rabbitmq_prefetch_count =
            Self::env_var("TOM_NOTIFIER_DISPATCH_RABBITMQ_PREFETCH_COUNT")?.parse()?;

        let fcm_project_id = Self::optional_env_var("TOM_NOTIFIER_DISPATCH_FCM_PROJECT_ID");
        let fcm_service_account_file =
            Self::optional_env_var("TOM_NOTIFIER_DISPATCH_FCM_SERVICE_ACCOUNT_FILE");
        let fcm_legacy_server_key =
            Self::optional_env_var("TOM_NOTIFIER_DISPATCH_FCM_LEGACY_SERVER_KEY");
        let fcm_v1_base_url = Self::optional_env_var("TOM_NOTIFIER_DISPATCH_FCM_V1_BASE_URL")
            .unwrap_or_else(|| "https://fcm.googleapis.com".to_string());
        let fcm_legacy_url = Self::optional_env_var("TOM_NOTIFIER_DISPATCH_FCM_LEGACY_URL")
            .unwrap_or_else(|| "https://fcm.googleapis.com/fcm/send".to_string());

        let expo_url = Self::optional_env_var("TOM_NOTIFIER_DISPATCH_EXPO_URL")
            .unwrap_or_else(|| "https://exp.host/--/api/v2/push/send".to_string());
        let expo_access_token = Self::optional_env_var("TOM_NOTIFIER_DISPATCH_EXPO_ACCESS_TOKEN");

        let web_push_vapid_public_key =
            Self::optional_env_var("TOM_NOTIFIER_DISPATCH_WEB_PUSH_VAPID_PUBLIC_KEY");
        let web_push_vapid_private_key =
            Self::optional_env_var("TOM_NOTIFIER_DISPATCH_WEB_PUSH_VAPID_PRIVATE_KEY");
        let web_push_vapid_subject =
            Self::optional_env_var("TOM_NOTIFIER_DISPATCH_WEB_PUSH_VAPID_SUBJECT");
        let web_push_icon = Self::optional_env_var("TOM_NOTIFIER_DISPATCH_WEB_PUSH_ICON");
        let web_push_badge = Self::optional_env_var("TOM_NOTIFIER_DISPATCH_WEB_PUSH_BADGE");
        let web_push_ttl = Duration::from_secs(Self::parse_or(
            "TOM_NOTIFIER_DISPATCH_WEB_PUSH_TTL",
            24 * 60 * 60,
        )?);

        let email_api_url = Self::optional_env_var("TOM_NOTIFIER_DISPATCH_EMAIL_API_URL");
        let email_api_key = Self::optional_env_var("TOM_NOTIFIER_DISPATCH_EMAIL_API_KEY");
        let email_sender = Self::optional_env_var("TOM_NOTIFIER_DISPATCH_EMAIL_SENDER");

        let http_timeout =
            Duration::from_secs(Self::parse_or("TOM_NOTIFIER_DISPATCH_HTTP_TIMEOUT", 10)?);
        let push_concurrency = Self::parse_or("TOM_NOTIFIER_DISPATCH_PUSH_CONCURRENCY", 8)?;
        let max_attempts = match Self::optional_env_var("TOM_NOTIFIER_DISPATCH_MAX_ATTEMPTS") {
            Some(max_attempts) => Some(max_attempts.parse()?),
            None => None,
        };

        Ok(Self {
            log_directory,
            log_filename,
            db_connection_string,
            db_name,
            rabbitmq_connection_string,
            rabbitmq_retry_interval,
            rabbitmq_dispatch_exchange_name,
            rabbitmq_dispatch_queue_name,
            rabbitmq_dispatch_routing_key,
            rabbitmq_prefetch_count,
            fcm_project_id,
            fcm_service_account_file,
            fcm_legacy_server_key,
            fcm_v1_base_url,
            fcm_legacy_url,
            expo_url,
            expo_access_token,
            web_push_vapid_public_key,
            web_push_vapid_private_key,
            web_push_vapid_subject,
            web_push_icon,
            web_push_badge,
            web_push_ttl,
            email_api_url,
            email_api_key,
            email_sender,
            http_timeout,
            push_concurrency,
            max_attempts,
        })
    }

    fn env_var(name: &'static str) -> anyhow::Result<String> {
        std::env::var(name).map_err(|_| anyhow!("environment variable {name} not set"))
    }

    /// Empty value counts as not set
    fn optional_env_var(name: &'static str) -> Option<String> {
        std::env::var(name).ok().filter(|value| !value.is_empty())
    }

    fn parse_or<T>(name: &'static str, default: T) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match Self::optional_env_var(name) {
            Some(value) => value
                .parse()
                .map_err(|err| anyhow!("environment variable {name} invalid: {err}")),
            None => Ok(default),
        }
    }
}
