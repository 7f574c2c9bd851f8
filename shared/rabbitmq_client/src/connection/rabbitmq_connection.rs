use super::{connection_callback::ConnectionCallback, RabbitmqConnectionConfig};
use crate::retry::retry;
use amqprs::connection::{Connection, OpenConnectionArguments};
use std::sync::Arc;
use tokio::{
    sync::{watch, Notify},
    task::JoinHandle,
};

///
/// RabbitMQ connection.
/// It runs background task that reopens connection whenever io failure occurs.
///
/// Current connection is published through [Self::connection],
/// `None` means connection is being reopened.
///
#[derive(Clone)]
pub struct RabbitmqConnection {
    inner: Arc<RabbitmqConnectionInner>,
}

struct RabbitmqConnectionInner {
    config: RabbitmqConnectionConfig,

    connection_rx: watch::Receiver<Option<Connection>>,
    blocked_rx: watch::Receiver<bool>,

    keep_alive_handle: JoinHandle<()>,
    close_notify: Arc<Notify>,
}

impl RabbitmqConnection {
    #[tracing::instrument(
        name = "RabbitMQ Connection",
        target = "rabbitmq_client::connection",
        skip_all
    )]
    pub async fn new(
        config: RabbitmqConnectionConfig,
        open_connection_args: OpenConnectionArguments,
    ) -> Result<Self, amqprs::error::Error> {
        let (blocked_tx, blocked_rx) = watch::channel(false);

        tracing::info!("opening connection");
        let connection = open(&open_connection_args, &blocked_tx).await?;

        let (connection_tx, connection_rx) = watch::channel(Some(connection.clone()));
        let close_notify = Arc::new(Notify::new());
        let keep_alive_handle = tokio::spawn(keep_alive(
            config.clone(),
            Arc::clone(&close_notify),
            connection,
            connection_tx,
            open_connection_args,
            blocked_tx,
        ));

        tracing::info!("connection opened");

        Ok(Self {
            inner: Arc::new(RabbitmqConnectionInner {
                config,
                connection_rx,
                blocked_rx,
                keep_alive_handle,
                close_notify,
            }),
        })
    }

    ///
    /// Close underlying connection and the task that reopens it.
    /// Consumers and producers using this connection must be closed first.
    ///
    #[tracing::instrument(
        name = "RabbitMQ Connection",
        target = "rabbitmq_client::connection",
        skip_all
    )]
    pub async fn close(self) {
        let Ok(inner) = Arc::try_unwrap(self.inner) else {
            tracing::error!("closing connection when connection clones exist is forbidden");
            return;
        };

        inner.close_notify.notify_one();
        if let Err(err) = inner.keep_alive_handle.await {
            tracing::error!(%err, "keep alive task failed");
        }
    }

    pub fn config(&self) -> &RabbitmqConnectionConfig {
        &self.inner.config
    }

    pub fn connection(&self) -> watch::Receiver<Option<Connection>> {
        self.inner.connection_rx.clone()
    }

    pub fn connection_blocked(&self) -> watch::Receiver<bool> {
        self.inner.blocked_rx.clone()
    }
}

async fn open(
    open_connection_args: &OpenConnectionArguments,
    blocked_tx: &watch::Sender<bool>,
) -> Result<Connection, amqprs::error::Error> {
    let connection = Connection::open(open_connection_args).await?;
    connection
        .register_callback(ConnectionCallback::new(blocked_tx.clone()))
        .await?;

    // new connection is never blocked from the start
    blocked_tx.send_replace(false);

    Ok(connection)
}

#[tracing::instrument(
    name = "RabbitMQ Connection",
    target = "rabbitmq_client::connection",
    skip_all
)]
async fn keep_alive(
    config: RabbitmqConnectionConfig,
    close_notify: Arc<Notify>,
    mut connection: Connection,
    connection_tx: watch::Sender<Option<Connection>>,
    open_connection_args: OpenConnectionArguments,
    blocked_tx: watch::Sender<bool>,
) {
    tracing::info!("keep alive started");

    loop {
        tokio::select! {
            biased;

            _ = close_notify.notified() => break,
            _ = connection.listen_network_io_failure() => {
                tracing::warn!("connection broken");
                connection_tx.send_replace(None);
            }
        }

        tokio::select! {
            biased;

            _ = close_notify.notified() => {
                tracing::info!("keep alive finished");
                return;
            }
            reopened = retry(config.retry_interval, "reopen connection", || {
                open(&open_connection_args, &blocked_tx)
            }) => {
                tracing::info!("connection reopened");
                connection = reopened;
                connection_tx.send_replace(Some(connection.clone()));
            }
        }
    }

    tracing::info!("closing connection");
    connection_tx.send_replace(None);
    match connection.close().await {
        Ok(()) => tracing::info!("connection closed"),
        Err(err) => tracing::warn!(%err, "closing connection failed"),
    }

    tracing::info!("keep alive finished");
}
