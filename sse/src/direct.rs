//! Data-owner streamer: fans catalog change events out from the event log
//! to one long-lived SSE connection per client.

use crate::connection::{ConnectionRegistry, Disconnect, StreamSession};
use crate::frame::Frame;
use crate::settings::StreamSettings;
use crate::shutdown::ShutdownSignal;
use crate::sink::{FrameSink, WriteAccounting};
use events::{ErrorKind, EventEnvelope, EventLog, LogEntry, StartPosition};
use log::*;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Serves one `text/event-stream` response per connecting client by polling
/// a session-private consumer group and interleaving log-derived frames with
/// protocol-maintenance frames until the connection ends.
pub struct DirectStreamer {
    log: Arc<dyn EventLog>,
    registry: Arc<ConnectionRegistry>,
    settings: StreamSettings,
    stream_key: String,
}

/// Consumer-group name bound to a session for the session's lifetime.
pub fn group_name(session_id: &str) -> String {
    format!("sse-group-{session_id}")
}

/// Consumer name within the session's group.
pub fn consumer_name(session_id: &str) -> String {
    format!("consumer-{session_id}")
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl DirectStreamer {
    pub fn new(
        log: Arc<dyn EventLog>,
        registry: Arc<ConnectionRegistry>,
        settings: StreamSettings,
        stream_key: impl Into<String>,
    ) -> Self {
        Self {
            log,
            registry,
            settings,
            stream_key: stream_key.into(),
        }
    }

    /// Run one streaming session to completion.
    ///
    /// Blocks the calling task until the session ends; the returned reason
    /// is for logging and tests, the response itself just closes.
    pub async fn stream(
        &self,
        session: StreamSession,
        sink: &mut dyn FrameSink,
        mut shutdown: ShutdownSignal,
    ) -> Disconnect {
        let connected = Frame::event(
            "connected",
            json!({
                "session_id": session.session_id,
                "mode": session.mode.to_string(),
                "client_ip": session.client_ip,
                "user_agent": session.user_agent,
            })
            .to_string(),
        );

        // Fail fast: never count a connection that never delivered a byte.
        if let Err(err) = sink.write_frame(connected.to_bytes()).await {
            debug!(
                "SSE session {} aborted before handshake: {err}",
                session.session_id
            );
            return Disconnect::HandshakeFailed;
        }

        let mut guard = self.registry.register(&session);
        info!(
            "SSE direct session {} connected ({} active)",
            session.session_id,
            self.registry.active()
        );

        let group = group_name(&session.session_id);
        let consumer = consumer_name(&session.session_id);

        // Tail start: only events appended after connect are delivered.
        match self
            .log
            .create_consumer_group(&self.stream_key, &group, StartPosition::Tail, true)
            .await
        {
            Ok(()) => {}
            Err(err) if err.error_kind == ErrorKind::GroupExists => {
                debug!("Consumer group {group} already exists, reusing");
            }
            Err(err) => warn!("Failed to create consumer group {group}: {err}"),
        }

        let reason = self
            .event_loop(&session, sink, &group, &consumer, &mut shutdown)
            .await;

        // Housekeeping failures never escalate; the response is closing anyway.
        if let Err(err) = self
            .log
            .destroy_consumer_group(&self.stream_key, &group)
            .await
        {
            warn!("Failed to destroy consumer group {group}: {err}");
        }
        guard.release();

        info!(
            "SSE direct session {} ended: {reason:?} ({} active)",
            session.session_id,
            self.registry.active()
        );
        reason
    }

    async fn event_loop(
        &self,
        session: &StreamSession,
        sink: &mut dyn FrameSink,
        group: &str,
        consumer: &str,
        shutdown: &mut ShutdownSignal,
    ) -> Disconnect {
        let started = Instant::now();
        let mut accounting = WriteAccounting::new(self.settings.write_failure_threshold);
        let mut queue: VecDeque<(String, Frame)> = VecDeque::new();
        let mut message_counter: u64 = 0;
        let mut last_message = Instant::now();
        let mut last_heartbeat = Instant::now();

        loop {
            if started.elapsed() >= self.settings.connection_timeout {
                return Disconnect::Timeout;
            }
            if sink.is_closed() {
                return Disconnect::ClientGone;
            }
            if shutdown.is_raised() {
                return Disconnect::Shutdown;
            }

            match self
                .log
                .read_new(
                    group,
                    consumer,
                    &self.stream_key,
                    self.settings.read_batch_size,
                    self.settings.read_block,
                )
                .await
            {
                Ok(entries) => {
                    for entry in entries {
                        match entry_frame(&entry) {
                            Some(frame) => queue.push_back((entry.id, frame)),
                            None => {
                                // Unreadable entry: acknowledge and move on so
                                // it cannot wedge the group's pending set.
                                warn!(
                                    "Skipping malformed entry {} on {}",
                                    entry.id, self.stream_key
                                );
                                if let Err(err) = self
                                    .log
                                    .acknowledge(&self.stream_key, group, &entry.id)
                                    .await
                                {
                                    warn!("Failed to acknowledge entry {}: {err}", entry.id);
                                }
                            }
                        }
                    }
                }
                Err(err) => warn!(
                    "Consumer group read failed for session {}: {err}",
                    session.session_id
                ),
            }

            // One send attempt per queued entry, in arrival order. An entry
            // is acknowledged only after its frame was written; a failed
            // entry is dropped, not retried.
            while let Some((entry_id, frame)) = queue.pop_front() {
                match sink.write_frame(frame.to_bytes()).await {
                    Ok(()) => {
                        accounting.success();
                        if let Err(err) =
                            self.log.acknowledge(&self.stream_key, group, &entry_id).await
                        {
                            warn!("Failed to acknowledge entry {entry_id}: {err}");
                        }
                    }
                    Err(err) => {
                        warn!(
                            "Dropped event frame for session {}: {err}",
                            session.session_id
                        );
                        if accounting.failure() {
                            return Disconnect::WriteFailure;
                        }
                    }
                }
            }

            if last_message.elapsed() >= self.settings.message_interval {
                message_counter += 1;
                let frame = Frame::event(
                    "timestamp",
                    json!({"counter": message_counter, "time": unix_now()}).to_string(),
                );
                match sink.write_frame(frame.to_bytes()).await {
                    Ok(()) => {
                        accounting.success();
                        last_message = Instant::now();
                    }
                    Err(err) => {
                        warn!(
                            "Dropped timestamp frame for session {}: {err}",
                            session.session_id
                        );
                        if accounting.failure() {
                            return Disconnect::WriteFailure;
                        }
                    }
                }
            }

            if last_heartbeat.elapsed() >= self.settings.heartbeat_interval {
                match sink.write_frame(Frame::comment("heartbeat").to_bytes()).await {
                    Ok(()) => {
                        accounting.success();
                        last_heartbeat = Instant::now();
                        if let Err(err) = self
                            .log
                            .extend_group_ttl(&self.stream_key, group, self.settings.group_ttl)
                            .await
                        {
                            warn!("Failed to extend TTL for group {group}: {err}");
                        }
                    }
                    Err(err) => {
                        warn!(
                            "Dropped heartbeat for session {}: {err}",
                            session.session_id
                        );
                        if accounting.failure() {
                            return Disconnect::WriteFailure;
                        }
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = shutdown.raised() => return Disconnect::Shutdown,
            }
        }
    }
}

/// Convert a log entry's envelope payload into its outbound frame, carrying
/// the log-assigned id so clients can resume-track.
fn entry_frame(entry: &LogEntry) -> Option<Frame> {
    let envelope: EventEnvelope = serde_json::from_str(&entry.payload).ok()?;
    Some(Frame::event_with_id(
        entry.id.clone(),
        envelope.event,
        envelope.data.to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::StreamMode;
    use crate::shutdown::ShutdownHandle;
    use crate::sink::{ChannelSink, WriteError};
    use crate::test_support::ScriptedSink;
    use events::{DomainEvent, EventWriter, MemoryEventLog};
    use std::time::Duration;
    use tokio::sync::mpsc;

    const STREAM: &str = "catalog-events";

    fn fast_settings() -> StreamSettings {
        StreamSettings {
            poll_interval: Duration::from_millis(10),
            read_block: Duration::from_millis(5),
            message_interval: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_millis(100),
            ..StreamSettings::default()
        }
    }

    struct Fixture {
        log: Arc<MemoryEventLog>,
        registry: Arc<ConnectionRegistry>,
        streamer: Arc<DirectStreamer>,
        shutdown: ShutdownHandle,
    }

    fn fixture(settings: StreamSettings) -> Fixture {
        let log = Arc::new(MemoryEventLog::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let streamer = Arc::new(DirectStreamer::new(
            log.clone() as Arc<dyn EventLog>,
            registry.clone(),
            settings,
            STREAM,
        ));
        Fixture {
            log,
            registry,
            streamer,
            shutdown: ShutdownHandle::new(),
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met within 2s");
    }

    fn assert_well_formed(frame: &str) {
        assert!(frame.ends_with("\n\n"), "unterminated frame: {frame:?}");
        assert_eq!(
            frame.matches("\n\n").count(),
            1,
            "torn or merged frame on the wire: {frame:?}"
        );
    }

    #[tokio::test]
    async fn delivers_appended_events_in_order_and_acknowledges() {
        let f = fixture(fast_settings());
        let (tx, mut rx) = mpsc::channel(64);
        let session = StreamSession::new("s1", StreamMode::Direct);

        let task = {
            let streamer = f.streamer.clone();
            let signal = f.shutdown.subscribe();
            tokio::spawn(async move {
                let mut sink = ChannelSink::new(tx, Duration::from_millis(100));
                streamer.stream(session, &mut sink, signal).await
            })
        };

        let connected = rx.recv().await.unwrap();
        let connected = String::from_utf8(connected.to_vec()).unwrap();
        assert!(connected.starts_with("event: connected\n"));
        assert_well_formed(&connected);

        // Events appended before the group exists would be invisible (tail
        // start), so wait for the binding first.
        let log = f.log.clone();
        wait_until(move || log.has_group(STREAM, "sse-group-s1")).await;

        let writer = EventWriter::new(f.log.clone() as Arc<dyn EventLog>, STREAM);
        let events = [
            DomainEvent::ProductCreated {
                product: serde_json::json!({"id": 42, "sku": "A-1"}),
            },
            DomainEvent::ProductUpdated {
                product: serde_json::json!({"id": 42, "price": "19.99"}),
            },
            DomainEvent::ProductDeleted {
                product: serde_json::json!({"id": 42}),
            },
        ];
        for event in &events {
            writer.publish(event).await.unwrap();
        }

        let mut received = Vec::new();
        for _ in 0..events.len() {
            let frame = tokio::time::timeout(Duration::from_millis(1100), rx.recv())
                .await
                .expect("event not delivered within one poll interval")
                .unwrap();
            received.push(String::from_utf8(frame.to_vec()).unwrap());
        }

        for frame in &received {
            assert_well_formed(frame);
        }
        assert!(received[0].contains("event: product.created\n"));
        assert!(received[1].contains("event: product.updated\n"));
        assert!(received[1].contains(r#""price":"19.99""#));
        assert!(received[2].contains("event: product.deleted\n"));

        // Every delivered entry must be acknowledged shortly after the write.
        let log = f.log.clone();
        wait_until(move || log.pending(STREAM, "sse-group-s1").is_empty()).await;

        f.shutdown.raise();
        assert_eq!(task.await.unwrap(), Disconnect::Shutdown);
        assert_eq!(f.registry.active(), 0);
        assert!(!f.log.has_group(STREAM, "sse-group-s1"));
    }

    #[tokio::test]
    async fn hard_timeout_ends_the_session() {
        let settings = StreamSettings {
            connection_timeout: Duration::from_millis(50),
            ..fast_settings()
        };
        let f = fixture(settings);
        let (tx, _rx) = mpsc::channel(64);
        let mut sink = ChannelSink::new(tx, Duration::from_millis(100));

        let reason = f
            .streamer
            .stream(
                StreamSession::new("s-timeout", StreamMode::Direct),
                &mut sink,
                f.shutdown.subscribe(),
            )
            .await;

        assert_eq!(reason, Disconnect::Timeout);
        assert_eq!(f.registry.active(), 0);
        assert!(!f.log.has_group(STREAM, "sse-group-s-timeout"));
    }

    #[tokio::test]
    async fn client_abort_ends_the_session() {
        let f = fixture(fast_settings());
        let (tx, mut rx) = mpsc::channel(64);
        let session = StreamSession::new("s-abort", StreamMode::Direct);

        let task = {
            let streamer = f.streamer.clone();
            let signal = f.shutdown.subscribe();
            tokio::spawn(async move {
                let mut sink = ChannelSink::new(tx, Duration::from_millis(100));
                streamer.stream(session, &mut sink, signal).await
            })
        };

        // Take the handshake, then hang up.
        rx.recv().await.unwrap();
        drop(rx);

        assert_eq!(task.await.unwrap(), Disconnect::ClientGone);
        assert_eq!(f.registry.active(), 0);
    }

    #[tokio::test]
    async fn three_consecutive_write_failures_end_the_session() {
        let settings = StreamSettings {
            message_interval: Duration::from_millis(10),
            poll_interval: Duration::from_millis(5),
            ..fast_settings()
        };
        let f = fixture(settings);

        // Handshake succeeds, then every timestamp write stalls.
        let mut sink = ScriptedSink::new().with_script([
            Ok(()),
            Err(WriteError::Timeout),
            Err(WriteError::Timeout),
            Err(WriteError::Timeout),
        ]);

        let reason = f
            .streamer
            .stream(
                StreamSession::new("s-flaky", StreamMode::Direct),
                &mut sink,
                f.shutdown.subscribe(),
            )
            .await;

        assert_eq!(reason, Disconnect::WriteFailure);
        assert_eq!(sink.event_names(), vec!["connected"]);
        assert_eq!(f.registry.active(), 0);
    }

    #[tokio::test]
    async fn intermittent_failures_do_not_end_the_session() {
        let settings = StreamSettings {
            message_interval: Duration::from_millis(10),
            poll_interval: Duration::from_millis(5),
            connection_timeout: Duration::from_millis(300),
            ..fast_settings()
        };
        let f = fixture(settings);

        // Two failures, a success, two more failures: the run never reaches
        // three, so the session lives until its hard timeout.
        let mut sink = ScriptedSink::new().with_script([
            Ok(()),
            Err(WriteError::Timeout),
            Err(WriteError::Timeout),
            Ok(()),
            Err(WriteError::Timeout),
            Err(WriteError::Timeout),
            Ok(()),
        ]);

        let reason = f
            .streamer
            .stream(
                StreamSession::new("s-blips", StreamMode::Direct),
                &mut sink,
                f.shutdown.subscribe(),
            )
            .await;

        assert_eq!(reason, Disconnect::Timeout);
        assert_eq!(f.registry.active(), 0);
    }

    #[tokio::test]
    async fn failed_handshake_never_registers() {
        let f = fixture(fast_settings());
        let mut sink = ScriptedSink::new().with_script([Err(WriteError::Timeout)]);

        let reason = f
            .streamer
            .stream(
                StreamSession::new("s-dead", StreamMode::Direct),
                &mut sink,
                f.shutdown.subscribe(),
            )
            .await;

        assert_eq!(reason, Disconnect::HandshakeFailed);
        assert_eq!(f.registry.active(), 0);
        assert!(!f.log.has_group(STREAM, "sse-group-s-dead"));
        assert!(sink.frames.is_empty());
    }

    #[tokio::test]
    async fn timestamps_and_heartbeats_flow_while_idle() {
        let settings = StreamSettings {
            message_interval: Duration::from_millis(20),
            heartbeat_interval: Duration::from_millis(50),
            connection_timeout: Duration::from_millis(200),
            ..fast_settings()
        };
        let f = fixture(settings);
        let (tx, mut rx) = mpsc::channel(64);
        let mut sink = ChannelSink::new(tx, Duration::from_millis(100));

        let reason = f
            .streamer
            .stream(
                StreamSession::new("s-idle", StreamMode::Direct),
                &mut sink,
                f.shutdown.subscribe(),
            )
            .await;
        assert_eq!(reason, Disconnect::Timeout);

        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(String::from_utf8(frame.to_vec()).unwrap());
        }

        let timestamps: Vec<&String> = frames
            .iter()
            .filter(|f| f.contains("event: timestamp\n"))
            .collect();
        assert!(timestamps.len() >= 2, "expected periodic timestamp frames");
        // Counters increase monotonically.
        assert!(timestamps[0].contains(r#""counter":1"#));
        assert!(timestamps[1].contains(r#""counter":2"#));

        assert!(
            frames.iter().any(|f| f.starts_with(": heartbeat")),
            "expected a comment-only heartbeat"
        );
        for frame in &frames {
            assert_well_formed(frame);
        }
    }

    #[tokio::test]
    async fn malformed_entries_are_skipped_and_acknowledged() {
        let f = fixture(fast_settings());
        let (tx, mut rx) = mpsc::channel(64);
        let session = StreamSession::new("s-poison", StreamMode::Direct);

        let task = {
            let streamer = f.streamer.clone();
            let signal = f.shutdown.subscribe();
            tokio::spawn(async move {
                let mut sink = ChannelSink::new(tx, Duration::from_millis(100));
                streamer.stream(session, &mut sink, signal).await
            })
        };

        rx.recv().await.unwrap();
        let log = f.log.clone();
        wait_until(move || log.has_group(STREAM, "sse-group-s-poison")).await;

        f.log.append(STREAM, "not json at all").await.unwrap();
        let log = f.log.clone();
        wait_until(move || log.pending(STREAM, "sse-group-s-poison").is_empty()).await;

        // Nothing beyond the handshake was forwarded.
        assert!(rx.try_recv().is_err());

        f.shutdown.raise();
        assert_eq!(task.await.unwrap(), Disconnect::Shutdown);
    }
}
