//! Plategate server binary — license plate plugin entry point.
//!
//! Starts the axum HTTP server, the outbox publisher, and the bus listener,
//! with structured logging, database initialization, broker registration,
//! and graceful shutdown on SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use plategate_bus::{BroadcastBus, EventBus};
use plategate_dispatch::{spawn_listener, Dispatcher, FailurePolicy};
use plategate_outbox::{OutboxPublisher, PublisherConfig};
use plategate_server::handlers::PlateScannedHandler;
use plategate_server::{app, config, AppState, OutboxRequeueSink};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("PLATEGATE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Initialize database
    let pool = plategate_db::create_pool(
        &config.database.path,
        plategate_db::DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool — check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied =
            plategate_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    let webhook_api_key = config.webhook.api_key.clone().unwrap_or_else(|| {
        tracing::warn!("webhook.api_key not set - webhook endpoint will be insecure!");
        "default-insecure-key".to_string()
    });

    // Event bus and the background tasks around it
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut background_tasks = Vec::new();
    let bus: Option<Arc<dyn EventBus>> = if config.bus.enabled {
        Some(Arc::new(BroadcastBus::new(config.bus.channel_capacity)))
    } else {
        tracing::warn!("event bus disabled, outbox rows will accumulate unpublished");
        None
    };

    if let Some(bus) = &bus {
        let requeue_sink = match config.dispatch.on_handler_failure {
            FailurePolicy::Requeue => Some(
                Arc::new(OutboxRequeueSink::new(pool.clone())) as Arc<dyn plategate_dispatch::RequeueSink>
            ),
            FailurePolicy::Discard => None,
        };
        let dispatcher = Arc::new(
            Dispatcher::new(config.dispatch.max_concurrency)
                .register(Arc::new(PlateScannedHandler::new(pool.clone())))
                .with_failure_policy(config.dispatch.on_handler_failure, requeue_sink),
        );
        background_tasks.push(spawn_listener(
            Arc::clone(bus),
            config.dispatch.channel.clone(),
            dispatcher,
            shutdown_rx.clone(),
        ));

        let publisher = Arc::new(OutboxPublisher::new(
            pool.clone(),
            Arc::clone(bus),
            PublisherConfig {
                poll_interval: Duration::from_secs(config.outbox.poll_interval_secs),
                batch_size: config.outbox.batch_size,
                max_attempts: config.outbox.max_attempts,
            },
        ));
        background_tasks.push(tokio::spawn(publisher.run(shutdown_rx.clone())));
    }

    // Broker self-registration happens in the background so a slow broker
    // never delays serving requests.
    if config.broker.enabled {
        let host = format!("{}:{}", config.server.host, config.server.port);
        tokio::spawn(plategate_server::broker::register_with_broker(
            config.broker.clone(),
            host,
            config.server.base_api_route.clone(),
        ));
    }

    // Build application
    let state = AppState {
        pool,
        bus,
        events_channel: config.dispatch.channel.clone(),
        webhook_api_key,
    };
    let app = app(state, &config.server.base_api_route);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting plategate server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Stop the publisher and listener once the HTTP server has drained,
    // then wait for them: a drain tick already in progress completes before
    // the process exits.
    let _ = shutdown_tx.send(true);
    for task in background_tasks {
        if let Err(e) = task.await {
            tracing::warn!("background task ended abnormally: {}", e);
        }
    }

    tracing::info!("plategate server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
