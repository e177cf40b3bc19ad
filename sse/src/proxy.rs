//! Aggregator-mode streamer: re-streams an upstream direct SSE feed to a
//! downstream client, one upstream leg per downstream connection.

use crate::connection::{ConnectionRegistry, Disconnect, StreamSession};
use crate::error::Error;
use crate::frame::{Frame, FrameAssembler};
use crate::settings::StreamSettings;
use crate::shutdown::ShutdownSignal;
use crate::sink::{FrameSink, WriteAccounting};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use log::*;
use reqwest::header;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Resolved upstream endpoint and credential, a constructor input supplied
/// by configuration/identity lookup.
#[derive(Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub token: SecretString,
}

impl UpstreamConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: SecretString::new(token.into()),
        }
    }

    fn events_url(&self) -> String {
        format!("{}/sse/events", self.base_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("token", &"[redacted]")
            .finish()
    }
}

/// Presents the identical client-facing protocol as the direct streamer
/// while sourcing frames from a second long-lived HTTP request to an
/// upstream direct endpoint. Frames are reassembled from arbitrary byte
/// chunks and forwarded verbatim.
pub struct ProxyStreamer {
    registry: Arc<ConnectionRegistry>,
    settings: StreamSettings,
    upstream: Option<UpstreamConfig>,
    client: reqwest::Client,
}

impl ProxyStreamer {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        settings: StreamSettings,
        upstream: Option<UpstreamConfig>,
    ) -> Self {
        // The upstream request stays open for the whole session, so its
        // timeout must outlast the hard connection timeout.
        let client = reqwest::Client::builder()
            .timeout(settings.connection_timeout + Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            registry,
            settings,
            upstream,
            client,
        }
    }

    /// Run one proxied streaming session to completion.
    pub async fn stream(
        &self,
        session: StreamSession,
        sink: &mut dyn FrameSink,
        mut shutdown: ShutdownSignal,
    ) -> Disconnect {
        let Some(upstream) = &self.upstream else {
            // Never attempt the upstream call with empty credentials.
            let frame = Frame::event(
                "error",
                json!({"message": "proxy upstream is not configured"}).to_string(),
            );
            let _ = sink.write_frame(frame.to_bytes()).await;
            warn!(
                "SSE proxy session {} refused: no upstream configured",
                session.session_id
            );
            return Disconnect::Unconfigured;
        };

        let connected = Frame::event(
            "connected",
            json!({
                "session_id": session.session_id,
                "mode": session.mode.to_string(),
                "upstream": upstream.base_url,
            })
            .to_string(),
        );
        if let Err(err) = sink.write_frame(connected.to_bytes()).await {
            debug!(
                "SSE proxy session {} aborted before handshake: {err}",
                session.session_id
            );
            return Disconnect::HandshakeFailed;
        }

        let mut guard = self.registry.register(&session);
        info!(
            "SSE proxy session {} connected, upstream {} ({} active)",
            session.session_id,
            upstream.base_url,
            self.registry.active()
        );

        let reason = match self.open_upstream(upstream).await {
            Ok(response) => {
                self.copy_loop(&session, sink, Box::pin(response.bytes_stream()), &mut shutdown)
                    .await
            }
            Err(err) => {
                warn!(
                    "SSE proxy session {} upstream request failed: {err}",
                    session.session_id
                );
                // Best-effort diagnostic; the connection is failing anyway.
                let frame = Frame::event(
                    "error",
                    json!({"message": "upstream connection failed"}).to_string(),
                );
                let _ = sink.write_frame(frame.to_bytes()).await;
                Disconnect::UpstreamFailed
            }
        };

        guard.release();
        info!(
            "SSE proxy session {} ended: {reason:?} ({} active)",
            session.session_id,
            self.registry.active()
        );
        reason
    }

    /// One outbound GET held open for the life of the proxy session.
    async fn open_upstream(&self, upstream: &UpstreamConfig) -> Result<reqwest::Response, Error> {
        let response = self
            .client
            .get(upstream.events_url())
            .bearer_auth(upstream.token.expose_secret())
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;
        Ok(response)
    }

    /// Streaming copy: reassemble whole frames from arbitrary chunks and
    /// forward each verbatim. Chunk sizes are transport-determined; the
    /// assembler accepts splits down to a single byte.
    async fn copy_loop<E: fmt::Display>(
        &self,
        session: &StreamSession,
        sink: &mut dyn FrameSink,
        mut upstream_body: impl Stream<Item = Result<Bytes, E>> + Unpin,
        shutdown: &mut ShutdownSignal,
    ) -> Disconnect {
        let deadline = Instant::now() + self.settings.connection_timeout;
        let mut assembler = FrameAssembler::new();
        let mut accounting = WriteAccounting::new(self.settings.write_failure_threshold);

        loop {
            if sink.is_closed() {
                return Disconnect::ClientGone;
            }
            if shutdown.is_raised() {
                return Disconnect::Shutdown;
            }

            let chunk = tokio::select! {
                chunk = upstream_body.next() => chunk,
                _ = tokio::time::sleep_until(deadline) => return Disconnect::Timeout,
                _ = shutdown.raised() => return Disconnect::Shutdown,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    assembler.push(&bytes);
                    while let Some(frame) = assembler.next_frame() {
                        match sink.write_frame(frame).await {
                            Ok(()) => accounting.success(),
                            Err(err) => {
                                warn!(
                                    "Dropped proxied frame for session {}: {err}",
                                    session.session_id
                                );
                                if accounting.failure() {
                                    return Disconnect::WriteFailure;
                                }
                            }
                        }
                    }
                }
                Some(Err(err)) => {
                    warn!(
                        "Upstream read failed for session {}: {err}",
                        session.session_id
                    );
                    let frame = Frame::event(
                        "error",
                        json!({"message": "upstream connection lost"}).to_string(),
                    );
                    let _ = sink.write_frame(frame.to_bytes()).await;
                    return Disconnect::UpstreamFailed;
                }
                None => {
                    // Graceful upstream EOF: flush whatever partial frame
                    // arrived, then tell the client the feed is gone.
                    if let Some(rest) = assembler.take_remainder() {
                        let _ = sink.write_frame(rest).await;
                    }
                    let frame = Frame::event(
                        "disconnected",
                        json!({"message": "upstream stream ended"}).to_string(),
                    );
                    let _ = sink.write_frame(frame.to_bytes()).await;
                    return Disconnect::UpstreamClosed;
                }
            }
        }
    }
}
