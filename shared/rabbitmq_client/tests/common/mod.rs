use amqprs::connection::{Connection, OpenConnectionArguments};
use rabbitmq_client::{RabbitmqConnection, RabbitmqConnectionConfig};
use std::time::Duration;
use tracing::level_filters::LevelFilter;

pub fn init_test_environment() {
    // variables may come from the environment as well
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_target(false)
        .with_test_writer()
        .init();
}

fn connection_uri() -> String {
    std::env::var("TEST_RABBITMQ_CONNECTION_URI").unwrap()
}

pub async fn create_connection() -> Connection {
    let args = OpenConnectionArguments::try_from(connection_uri().as_str()).unwrap();

    Connection::open(&args).await.unwrap()
}

pub async fn create_rabbitmq_connection() -> RabbitmqConnection {
    let config = RabbitmqConnectionConfig {
        retry_interval: Duration::from_secs(1),
    };
    let args = OpenConnectionArguments::try_from(connection_uri().as_str()).unwrap();

    RabbitmqConnection::new(config, args).await.unwrap()
}
