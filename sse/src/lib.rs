//! Server-Sent Events (SSE) distribution for catalog change events.
//!
//! This crate is the real-time distribution subsystem: it fans change events
//! out from an ordered event log to many concurrent long-lived HTTP streaming
//! connections, in one of two modes.
//!
//! # Architecture
//!
//! - **One task per connection**: each streaming session runs on its own
//!   tokio task with no intra-connection parallelism; sessions share no
//!   mutable state beyond the [`connection::ConnectionRegistry`].
//! - **DirectStreamer** (data-owner mode): creates a private consumer group
//!   against the event log per session, polls it continuously, and
//!   multiplexes log-derived frames with periodic `timestamp` frames and
//!   comment-only heartbeats onto the outbound stream.
//! - **ProxyStreamer** (aggregator mode): holds a second long-lived HTTP
//!   request open to an upstream direct endpoint, reassembles whole SSE
//!   frames from arbitrary byte chunks, and forwards each frame verbatim to
//!   its own downstream client.
//! - **FrameSink**: the downstream write seam. The production sink is a
//!   bounded channel feeding the HTTP response body; a dropped receiver is
//!   the peer-gone signal and a stalled channel past the write timeout counts
//!   as a write failure. Three consecutive write failures end a session.
//! - **Whole frames only**: every sink write is one complete frame, so
//!   heartbeats can never interleave mid-frame on the wire.
//!
//! # Session lifecycle
//!
//! 1. Initial `connected` frame; a failed first write aborts before the
//!    session is ever counted.
//! 2. Registry registration (guarded; released exactly once on every exit
//!    path) and, in direct mode, consumer-group creation at the log tail.
//! 3. Event loop until client abort, hard timeout, repeated write failures,
//!    administrative shutdown, or (proxy) upstream EOF/error.
//! 4. Best-effort consumer-group teardown; failures there are logged and
//!    never tear down the response.
//!
//! # Modules
//!
//! - `connection`: session metadata, registry with exactly-once release
//! - `frame`: wire-format encoder and incremental frame assembler
//! - `sink`: downstream write abstraction and the channel-backed sink
//! - `direct`: the data-owner streamer
//! - `proxy`: the re-streaming proxy
//! - `settings`: tunable intervals and thresholds
//! - `shutdown`: administrative disconnect signal

pub mod connection;
pub mod direct;
pub mod error;
pub mod frame;
pub mod proxy;
pub mod settings;
pub mod shutdown;
pub mod sink;

pub use connection::{ConnectionRegistry, Disconnect, StreamMode, StreamSession};
pub use direct::DirectStreamer;
pub use frame::{Frame, FrameAssembler};
pub use proxy::{ProxyStreamer, UpstreamConfig};
pub use settings::StreamSettings;
pub use shutdown::{ShutdownHandle, ShutdownSignal};
pub use sink::{ChannelSink, FrameSink, WriteAccounting, WriteError};

#[cfg(test)]
pub(crate) mod test_support;
