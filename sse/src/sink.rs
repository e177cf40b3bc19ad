//! Downstream write abstraction for streaming sessions.
//!
//! A streaming transport gives no synchronous delivery confirmation, so
//! failure detection combines what signals exist: a dropped response body is
//! the peer-gone signal, and a send that cannot complete within the write
//! timeout counts as a failed attempt. Either alone marks the write failed.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Why a frame write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    /// The peer is gone; no further write can succeed.
    Closed,
    /// The write did not complete within the write timeout. The connection
    /// may still recover; the caller's consecutive-failure accounting
    /// decides when to give up.
    Timeout,
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WriteError::Closed => write!(f, "peer closed the connection"),
            WriteError::Timeout => write!(f, "write timed out"),
        }
    }
}

/// Where a session's frames go. Every write is exactly one complete frame;
/// partial writes cannot exist at this seam, so heartbeats never interleave
/// mid-frame on the wire.
#[async_trait]
pub trait FrameSink: Send {
    async fn write_frame(&mut self, frame: Bytes) -> Result<(), WriteError>;

    /// Best-effort peer-liveness check, true once the peer is known gone.
    fn is_closed(&self) -> bool;
}

/// Production sink: a bounded channel whose receiver feeds the HTTP response
/// body stream. The channel dropping its receiver is the client-abort
/// signal; a full channel past the write timeout is a stalled consumer.
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
    write_timeout: Duration,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>, write_timeout: Duration) -> Self {
        Self { tx, write_timeout }
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn write_frame(&mut self, frame: Bytes) -> Result<(), WriteError> {
        match tokio::time::timeout(self.write_timeout, self.tx.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(WriteError::Closed),
            Err(_) => Err(WriteError::Timeout),
        }
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consecutive write-failure accounting shared by both streamers.
///
/// Any failed send increments the run; any success resets it. Only an
/// unbroken run reaching the threshold is fatal to the session.
pub struct WriteAccounting {
    threshold: u32,
    consecutive: u32,
}

impl WriteAccounting {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive: 0,
        }
    }

    pub fn success(&mut self) {
        self.consecutive = 0;
    }

    /// Record a failed write. Returns true when the unbroken failure run has
    /// reached the threshold and the session must end.
    pub fn failure(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_resets_the_failure_run() {
        let mut accounting = WriteAccounting::new(3);
        assert!(!accounting.failure());
        assert!(!accounting.failure());
        accounting.success();
        assert!(!accounting.failure());
        assert!(!accounting.failure());
        assert!(accounting.failure());
    }

    #[tokio::test]
    async fn write_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut sink = ChannelSink::new(tx, Duration::from_millis(100));

        sink.write_frame(Bytes::from("event: a\ndata: 1\n\n"))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from("event: a\ndata: 1\n\n"));
    }

    #[tokio::test]
    async fn dropped_receiver_reports_closed() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let mut sink = ChannelSink::new(tx, Duration::from_millis(100));

        assert!(sink.is_closed());
        assert_eq!(
            sink.write_frame(Bytes::from_static(b"x")).await,
            Err(WriteError::Closed)
        );
    }

    #[tokio::test]
    async fn full_channel_reports_timeout() {
        let (tx, _rx) = mpsc::channel(1);
        let mut sink = ChannelSink::new(tx, Duration::from_millis(20));

        sink.write_frame(Bytes::from_static(b"first")).await.unwrap();
        // Receiver never drains; the second write must time out, not hang.
        assert_eq!(
            sink.write_frame(Bytes::from_static(b"second")).await,
            Err(WriteError::Timeout)
        );
    }
}
