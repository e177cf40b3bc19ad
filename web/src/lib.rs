//! HTTP layer: router, controllers, and the SSE endpoint handlers.

use events::{EventLog, EventWriter};
use service::config::Config;
use std::sync::Arc;
use std::time::Duration;
use ::sse::{
    ConnectionRegistry, DirectStreamer, ProxyStreamer, ShutdownHandle, StreamSettings,
    UpstreamConfig,
};

mod controller;
mod error;
pub mod router;
mod sse;

pub use error::Error;

/// Application state shared across handlers.
/// Needs to implement Clone to be able to be passed into Router as State.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub event_log: Arc<dyn EventLog>,
    pub event_writer: EventWriter,
    pub registry: Arc<ConnectionRegistry>,
    pub direct_streamer: Arc<DirectStreamer>,
    pub proxy_streamer: Arc<ProxyStreamer>,
    pub shutdown: Arc<ShutdownHandle>,
}

impl AppState {
    /// Wire the streaming infrastructure from configuration. Both streamers
    /// are built; the events handler picks one per request by serving mode.
    pub fn new(config: Config, event_log: Arc<dyn EventLog>, shutdown: Arc<ShutdownHandle>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let settings = stream_settings(&config);

        let event_writer = EventWriter::new(event_log.clone(), config.event_stream_key.clone());
        let direct_streamer = Arc::new(DirectStreamer::new(
            event_log.clone(),
            registry.clone(),
            settings.clone(),
            config.event_stream_key.clone(),
        ));

        let upstream = match (config.upstream_base_url(), config.upstream_api_token()) {
            (Some(base_url), Some(token)) => Some(UpstreamConfig::new(base_url, token)),
            _ => None,
        };
        let proxy_streamer = Arc::new(ProxyStreamer::new(registry.clone(), settings, upstream));

        Self {
            config,
            event_log,
            event_writer,
            registry,
            direct_streamer,
            proxy_streamer,
            shutdown,
        }
    }
}

/// Bind the configured interface and serve the router until the process is
/// told to stop. Ctrl-C raises the administrative shutdown signal first so
/// every open streaming session ends promptly instead of waiting out its
/// hard timeout.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let config = app_state.config.clone();
    let shutdown = app_state.shutdown.clone();
    let router = router::define_routes(app_state);

    let interface = config.interface.as_deref().unwrap_or("127.0.0.1");
    let addr = format!("{interface}:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("Server starting... listening for connections on http://{addr}");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await
}

async fn shutdown_signal(shutdown: Arc<ShutdownHandle>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Failed to install shutdown signal handler: {err}");
        return;
    }
    log::info!("Shutdown signal received, closing open streams");
    shutdown.raise();
}

/// Map the flat configuration knobs onto the streamer settings set.
pub fn stream_settings(config: &Config) -> StreamSettings {
    StreamSettings {
        poll_interval: Duration::from_millis(config.sse_poll_interval_millis),
        read_block: Duration::from_millis(config.sse_read_block_millis),
        read_batch_size: config.sse_read_batch_size,
        message_interval: Duration::from_secs(config.sse_message_interval_secs),
        heartbeat_interval: Duration::from_secs(config.sse_heartbeat_interval_secs),
        connection_timeout: Duration::from_secs(config.sse_connection_timeout_secs),
        write_failure_threshold: config.sse_write_failure_threshold,
        write_timeout: Duration::from_secs(config.sse_write_timeout_secs),
        channel_capacity: config.sse_channel_capacity,
        group_ttl: Duration::from_secs(config.sse_group_ttl_secs),
    }
}
