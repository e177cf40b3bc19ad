use crate::{stream_settings, AppState};
use ::sse::{ChannelSink, StreamMode, StreamSession};
use async_stream::stream;
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use log::*;
use service::config::ServerMode;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// SSE handler that establishes one long-lived streaming connection per
/// client. The session runs on its own task writing whole frames into a
/// bounded channel; this handler just turns the channel into the response
/// body and sets the streaming headers.
pub(crate) async fn events(
    State(app_state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let mode = match app_state.config.mode {
        ServerMode::Direct => StreamMode::Direct,
        ServerMode::Proxy => StreamMode::Proxy,
    };

    let mut session = StreamSession::generate(mode);
    if let Some(ConnectInfo(addr)) = connect_info {
        session = session.with_client_ip(addr.ip().to_string());
    }
    if let Some(user_agent) = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
    {
        session = session.with_user_agent(user_agent);
    }

    debug!(
        "Establishing {mode} SSE connection for session {}",
        session.session_id
    );

    let settings = stream_settings(&app_state.config);
    let (tx, mut rx) = mpsc::channel::<Bytes>(settings.channel_capacity);
    let signal = app_state.shutdown.subscribe();

    tokio::spawn(async move {
        let mut sink = ChannelSink::new(tx, settings.write_timeout);
        match mode {
            StreamMode::Direct => {
                app_state
                    .direct_streamer
                    .stream(session, &mut sink, signal)
                    .await
            }
            StreamMode::Proxy => {
                app_state
                    .proxy_streamer
                    .stream(session, &mut sink, signal)
                    .await
            }
        };
    });

    // Frames arrive whole from the channel and pass through untouched.
    let body = stream! {
        while let Some(frame) = rx.recv().await {
            yield Ok::<Bytes, Infallible>(frame);
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        // Disable intermediary response buffering (nginx and friends).
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(body))
        .unwrap_or_else(|err| {
            error!("Failed to build SSE response: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}
