use amqprs::{
    channel::{
        BasicGetArguments, BasicPublishArguments, Channel, QueueDeclareArguments,
    },
    connection::{Connection, OpenConnectionArguments},
    BasicProperties,
};
use bson::{doc, DateTime, Document};
use mongodb::{options::ClientOptions, Client, Database};
use std::{sync::Once, time::Duration};
use tokio::time::{sleep, Instant};
use uuid::Uuid;

static INIT_ENV_ONCE: Once = Once::new();

pub fn init_env() {
    INIT_ENV_ONCE.call_once(|| {
        let _ = dotenvy::dotenv();
    });
}

fn env_var(name: &str) -> String {
    std::env::var(name).unwrap()
}

pub fn dispatch_exchange() -> String {
    env_var("TOM_NOTIFIER_DISPATCH_RABBITMQ_DISPATCH_EXCHANGE_NAME")
}

pub fn dispatch_queue() -> String {
    env_var("TOM_NOTIFIER_DISPATCH_RABBITMQ_DISPATCH_QUEUE_NAME")
}

pub fn dispatch_routing_key() -> String {
    env_var("TOM_NOTIFIER_DISPATCH_RABBITMQ_DISPATCH_ROUTING_KEY")
}

pub fn retry_queue(delay: Duration) -> String {
    format!("{}.retry.{}ms", dispatch_queue(), delay.as_millis())
}

pub async fn init_rabbitmq() -> (Connection, Channel) {
    let connection_string = env_var("TOM_NOTIFIER_DISPATCH_RABBITMQ_CONNECTION_STRING");
    let args = OpenConnectionArguments::try_from(connection_string.as_str()).unwrap();
    let connection = Connection::open(&args).await.unwrap();
    let channel = connection.open_channel(None).await.unwrap();

    (connection, channel)
}

pub async fn destroy_rabbitmq(connection: Connection, channel: Channel) {
    channel.close().await.unwrap();
    connection.close().await.unwrap();
}

pub async fn publish_job(channel: &Channel, content: Vec<u8>) {
    let args = BasicPublishArguments::new(&dispatch_exchange(), &dispatch_routing_key());
    channel
        .basic_publish(BasicProperties::default(), content, args)
        .await
        .unwrap();
}

/// Number of messages ready for delivery
pub async fn ready_messages(channel: &Channel, queue: &str) -> u32 {
    let args = QueueDeclareArguments::new(queue).passive(true).finish();
    let (_, message_count, _) = channel.queue_declare(args).await.unwrap().unwrap();

    message_count
}

///
/// Takes one message out of the queue, waiting up to `wait` for it to arrive.
///
pub async fn take_message(channel: &Channel, queue: &str, wait: Duration) -> Option<Vec<u8>> {
    let deadline = Instant::now() + wait;
    loop {
        let mut args = BasicGetArguments::new(queue);
        args.no_ack = true;
        if let Some((_, _, content)) = channel.basic_get(args).await.unwrap() {
            return Some(content);
        }
        if Instant::now() >= deadline {
            return None;
        }
        sleep(Duration::from_millis(100)).await;
    }
}

pub async fn database() -> Database {
    let connection_string = env_var("TOM_NOTIFIER_DISPATCH_DB_CONNECTION_STRING");
    let db_client_options = ClientOptions::parse(connection_string).await.unwrap();
    let db_client = Client::with_options(db_client_options).unwrap();

    db_client.database(&env_var("TOM_NOTIFIER_DISPATCH_DB_NAME"))
}

pub fn random_user_id() -> i64 {
    (Uuid::new_v4().as_u128() as i64) & i64::MAX
}

pub async fn seed_user(db: &Database, id: i64, name: &str) {
    db.collection::<Document>("users")
        .insert_one(doc! {
            "_id": id,
            "name": name,
            "email": format!("{}@example.com", name.to_lowercase()),
            "email_verified_at": DateTime::now(),
        })
        .await
        .unwrap();
}

pub async fn remove_users(db: &Database, ids: &[i64]) {
    for id in ids {
        db.collection::<Document>("users")
            .delete_one(doc! { "_id": id })
            .await
            .unwrap();
        db.collection::<Document>("notification_preferences")
            .delete_many(doc! { "owner_id": id })
            .await
            .unwrap();
        db.collection::<Document>("notifications")
            .delete_many(doc! { "recipient_id": id })
            .await
            .unwrap();
        db.collection::<Document>("delivery_attempts")
            .delete_many(doc! { "recipient_id": id })
            .await
            .unwrap();
    }
}
