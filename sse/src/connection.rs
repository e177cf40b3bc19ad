//! Session metadata and the process-wide connection registry.

use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Which streamer owns the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Direct,
    Proxy,
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StreamMode::Direct => write!(f, "direct"),
            StreamMode::Proxy => write!(f, "proxy"),
        }
    }
}

/// Ephemeral per-connection state. Owned exclusively by the streamer
/// handling the connection and destroyed when it closes; never persisted or
/// shared across connections.
#[derive(Debug, Clone)]
pub struct StreamSession {
    pub session_id: String,
    pub mode: StreamMode,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub connected_at: SystemTime,
}

impl StreamSession {
    pub fn new(session_id: impl Into<String>, mode: StreamMode) -> Self {
        Self {
            session_id: session_id.into(),
            mode,
            client_ip: None,
            user_agent: None,
            connected_at: SystemTime::now(),
        }
    }

    /// Generate a session with a fresh v4 UUID id.
    pub fn generate(mode: StreamMode) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), mode)
    }

    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Why a streaming session ended. Feeds logging and tests; the HTTP layer
/// ends the response the same way regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// The initial `connected` frame could not be written; the session was
    /// never registered.
    HandshakeFailed,
    /// The downstream client went away.
    ClientGone,
    /// The hard connection timeout elapsed. A designed lifecycle end, not an
    /// error; clients reconnect per standard SSE retry semantics.
    Timeout,
    /// Consecutive downstream write failures crossed the threshold.
    WriteFailure,
    /// The administrative shutdown signal was raised.
    Shutdown,
    /// Proxy only: the upstream was not configured; nothing was attempted.
    Unconfigured,
    /// Proxy only: the upstream connection failed or returned an error.
    UpstreamFailed,
    /// Proxy only: the upstream stream ended cleanly.
    UpstreamClosed,
}

/// Registered-session observability data.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub mode: StreamMode,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub connected_at: SystemTime,
}

/// Process-wide accounting of open streaming connections.
///
/// The counter is capacity observability only; it never rejects a
/// connection. Registration hands back a [`ConnectionGuard`] whose release
/// is idempotent, so every exit path (including panics unwinding the session
/// task) decrements exactly once.
pub struct ConnectionRegistry {
    active: AtomicUsize,
    sessions: DashMap<String, SessionInfo>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
            sessions: DashMap::new(),
        }
    }

    /// Number of currently open streaming connections.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Snapshot of a registered session, if still open.
    pub fn session(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
    }

    pub fn register(self: &Arc<Self>, session: &StreamSession) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.sessions.insert(
            session.session_id.clone(),
            SessionInfo {
                mode: session.mode,
                client_ip: session.client_ip.clone(),
                user_agent: session.user_agent.clone(),
                connected_at: session.connected_at,
            },
        );

        ConnectionGuard {
            registry: Arc::clone(self),
            session_id: session.session_id.clone(),
            released: false,
        }
    }

    fn release(&self, session_id: &str) {
        self.sessions.remove(session_id);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped registration slot. Dropping the guard releases the slot, so the
/// decrement happens on every exit branch; calling [`Self::release`] first
/// makes the drop a no-op.
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    session_id: String,
    released: bool,
}

impl ConnectionGuard {
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release(&self.session_id);
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.release();
    }
}
