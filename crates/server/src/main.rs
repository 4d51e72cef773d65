//! jobcast server entry point.
//!
//! Runs the HTTP/websocket front end, the queue consumers and the
//! notification broadcaster in one process.

mod export;

use std::sync::Arc;

use anyhow::{Context, anyhow};
use futures::future::{self, BoxFuture, FutureExt};
use jobcast_api::{AppState, NotificationBroadcaster, RoomRegistry, build_router};
use jobcast_common::{Config, IdGenerator, LogFormat};
use jobcast_queue::{
    ConnectionTask, ConsumerPool, ConsumerSettings, JobExecutor, QueueConsumer, RedeliveryPolicy,
    RedisPubSub, RedisWorkQueue, ResultPublisher,
};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::export::ExportExecutor;

/// Initialize tracing with the configured output format.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "jobcast=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Resolves with an error once any Redis connection task exits.
///
/// No reconnect policy is installed, so an exit means the broker is gone.
fn broker_loss(tasks: Vec<ConnectionTask>) -> BoxFuture<'static, anyhow::Error> {
    if tasks.is_empty() {
        return future::pending().boxed();
    }

    async move {
        let (result, _, _) = future::select_all(tasks).await;
        match result {
            Ok(Ok(())) => anyhow!("Redis connection closed"),
            Ok(Err(e)) => anyhow::Error::new(e).context("Redis connection lost"),
            Err(e) => anyhow::Error::new(e).context("Redis connection task failed"),
        }
    }
    .boxed()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(config.logging.format);

    info!("Starting jobcast server...");

    tokio::fs::create_dir_all(&config.server.public_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.server.public_dir))?;

    // Notification channel
    let (pubsub, mut connection_tasks) =
        RedisPubSub::new(&config.redis.url, &config.notifications.channel)
            .await
            .context("Failed to connect Redis Pub/Sub")?;
    let notifications = pubsub.subscribe_local();
    let _forwarder = pubsub.start().await?;
    let (publisher, publisher_task) =
        ResultPublisher::spawn(Arc::new(pubsub.clone()), pubsub.channel());
    info!(channel = %pubsub.channel(), "Connected to Redis Pub/Sub");

    // Producer side of the work queue
    let id_gen = IdGenerator::new();
    let producer_id = format!("producer-{}", id_gen.generate_token());
    let (producer, producer_task) =
        RedisWorkQueue::connect(&config.redis.url, &config.queue.name, &producer_id)
            .await
            .context("Failed to connect work queue")?;
    connection_tasks.push(producer_task);
    info!(queue = %config.queue.name, "Connected to Redis work queue");

    // Queue consumers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let executor: Arc<dyn JobExecutor> = Arc::new(ExportExecutor::new(
        &config.server.public_dir,
        config.export.rows,
    ));
    let settings = ConsumerSettings {
        redelivery: RedeliveryPolicy::new(config.queue.max_redeliveries),
        poll_timeout: config.queue.poll_timeout(),
    };

    let mut pool = ConsumerPool::new(shutdown_rx.clone());
    for index in 0..config.queue.workers {
        let consumer_id = config.queue.consumer_id(index);
        let (queue, task) =
            RedisWorkQueue::connect(&config.redis.url, &config.queue.name, &consumer_id).await?;
        connection_tasks.push(task);
        pool.spawn(QueueConsumer::new(
            consumer_id,
            Arc::new(queue),
            Arc::clone(&executor),
            publisher.clone(),
            settings,
        ));
    }
    drop(publisher);
    info!(workers = pool.len(), "Queue consumers started");

    // Websocket fan-out
    let rooms = Arc::new(RoomRegistry::new());
    let broadcaster =
        tokio::spawn(NotificationBroadcaster::broadcast_all(Arc::clone(&rooms)).run(notifications));

    // HTTP server
    let state = AppState::new(Arc::new(producer))
        .with_rooms(Arc::clone(&rooms))
        .with_connection_buffer(config.notifications.connection_buffer);
    let app = build_router(state, &config.server.public_dir);

    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    let mut server_shutdown = shutdown_rx;
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    // Run until a signal, a lost broker connection or a failed consumer.
    let consumers_ran = !pool.is_empty();
    let outcome = tokio::select! {
        () = shutdown_signal() => Ok(()),
        e = broker_loss(connection_tasks) => Err(e),
        result = pool.join(), if consumers_ran => match result {
            Ok(()) => Err(anyhow!("queue consumers stopped unexpectedly")),
            Err(e) => Err(anyhow::Error::new(e).context("queue consumer failed")),
        },
    };

    if let Err(e) = &outcome {
        error!(error = %e, "Fatal error, shutting down");
    }

    // Consumers finish the job in hand, then stop.
    let _ = shutdown_tx.send(true);
    while !pool.is_empty() {
        if let Err(e) = pool.join().await {
            warn!(error = %e, "Queue consumer failed during shutdown");
        }
    }
    // Flush outcomes queued by the consumers before the channel goes away.
    let _ = publisher_task.await;

    if let Err(e) = pubsub.shutdown().await {
        warn!(error = %e, "Failed to close Redis Pub/Sub cleanly");
    }
    broadcaster.abort();

    let closed = rooms.close_all().await;
    info!(connections = closed, "Websocket connections closed");

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP server error"),
        Err(e) => error!(error = %e, "HTTP server task failed"),
    }

    info!("Server shutdown complete");
    outcome
}
