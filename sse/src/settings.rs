use std::time::Duration;

/// Tunable intervals and thresholds for streaming sessions.
///
/// The defaults encode real operational trade-offs (disconnect detection
/// latency vs. false positives); deployments override them through the
/// service configuration rather than editing code.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Sleep between poll cycles in the direct event loop.
    pub poll_interval: Duration,
    /// Short block passed to the consumer-group read each poll cycle.
    pub read_block: Duration,
    /// Maximum entries drained from the log per poll cycle.
    pub read_batch_size: usize,
    /// Interval between periodic `timestamp` liveness frames.
    pub message_interval: Duration,
    /// Interval between comment-only heartbeat frames.
    pub heartbeat_interval: Duration,
    /// Hard wall-clock cap on any one streaming connection.
    pub connection_timeout: Duration,
    /// Consecutive downstream write failures that end a session.
    pub write_failure_threshold: u32,
    /// How long one frame write may stall before it counts as failed.
    pub write_timeout: Duration,
    /// Capacity of the per-session frame channel to the response body.
    pub channel_capacity: usize,
    /// TTL extension applied to the consumer group on each heartbeat,
    /// for log backends that expire idle groups.
    pub group_ttl: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            read_block: Duration::from_millis(100),
            read_batch_size: 32,
            message_interval: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(600),
            write_failure_threshold: 3,
            write_timeout: Duration::from_secs(5),
            channel_capacity: 64,
            group_ttl: Duration::from_secs(1800),
        }
    }
}
