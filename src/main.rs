use events::{EventLog, MemoryEventLog};
use log::*;
use service::config::Config;
use service::logging::Logger;
use service::ServerMode;
use sse::ShutdownHandle;
use std::sync::Arc;
use web::AppState;

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config);

    info!(
        "Starting catalog sync server in {} mode on stream '{}'",
        config.mode, config.event_stream_key
    );
    if config.mode == ServerMode::Proxy && config.upstream_base_url().is_none() {
        warn!("Proxy mode without an upstream base URL; streaming clients will be refused");
    }

    // Development backend. Production deployments swap in a durable log
    // implementing the same trait.
    let event_log: Arc<dyn EventLog> = Arc::new(MemoryEventLog::new());
    let shutdown = Arc::new(ShutdownHandle::new());
    let app_state = AppState::new(config, event_log, shutdown);

    web::init_server(app_state)
        .await
        .expect("Server failed to start");
}
