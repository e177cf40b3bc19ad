use crate::error::{Error, ErrorKind};
use crate::event_log::{EntryId, EventLog, LogEntry, StartPosition};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct StoredEntry {
    seq: u64,
    payload: String,
}

#[derive(Debug)]
struct Group {
    /// Sequence number of the next entry to deliver.
    cursor: u64,
    /// Delivered entries awaiting acknowledgment, keyed by entry id.
    pending: HashSet<EntryId>,
}

#[derive(Debug, Default)]
struct Stream {
    entries: Vec<StoredEntry>,
    next_seq: u64,
    groups: HashMap<String, Group>,
}

/// In-process [`EventLog`] implementation.
///
/// Keeps every appended entry for the process lifetime (no retention window)
/// and tracks one cursor per consumer group. Blocking reads park on a
/// [`Notify`] that appenders wake. Used in development mode and throughout
/// the test suites; a production deployment points the streamers at a durable
/// backend implementing the same trait.
pub struct MemoryEventLog {
    streams: Mutex<HashMap<String, Stream>>,
    appended: Notify,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            appended: Notify::new(),
        }
    }

    /// Number of entries retained for a stream. Test observability only.
    pub fn len(&self, stream_key: &str) -> usize {
        let streams = self.streams.lock().unwrap();
        streams.get(stream_key).map_or(0, |s| s.entries.len())
    }

    pub fn is_empty(&self, stream_key: &str) -> bool {
        self.len(stream_key) == 0
    }

    /// Entry ids delivered to the group but not yet acknowledged.
    pub fn pending(&self, stream_key: &str, group: &str) -> Vec<EntryId> {
        let streams = self.streams.lock().unwrap();
        streams
            .get(stream_key)
            .and_then(|s| s.groups.get(group))
            .map(|g| {
                let mut ids: Vec<EntryId> = g.pending.iter().cloned().collect();
                ids.sort_by_key(|id| id.parse::<u64>().unwrap_or(u64::MAX));
                ids
            })
            .unwrap_or_default()
    }

    /// Whether the group is currently registered on the stream.
    pub fn has_group(&self, stream_key: &str, group: &str) -> bool {
        let streams = self.streams.lock().unwrap();
        streams
            .get(stream_key)
            .map_or(false, |s| s.groups.contains_key(group))
    }

    fn drain_new(stream: &mut Stream, group_name: &str, max_count: usize) -> Vec<LogEntry> {
        let Some(group) = stream.groups.get_mut(group_name) else {
            return Vec::new();
        };

        let start_cursor = group.cursor;
        let mut batch = Vec::new();
        for entry in stream
            .entries
            .iter()
            .filter(|e| e.seq >= start_cursor)
            .take(max_count)
        {
            let id = entry.seq.to_string();
            group.pending.insert(id.clone());
            group.cursor = entry.seq + 1;
            batch.push(LogEntry {
                id,
                payload: entry.payload.clone(),
            });
        }
        batch
    }
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, stream_key: &str, payload: &str) -> Result<EntryId, Error> {
        let id = {
            let mut streams = self.streams.lock().unwrap();
            let stream = streams.entry(stream_key.to_string()).or_default();
            let seq = stream.next_seq;
            stream.next_seq += 1;
            stream.entries.push(StoredEntry {
                seq,
                payload: payload.to_string(),
            });
            seq.to_string()
        };

        self.appended.notify_waiters();
        Ok(id)
    }

    async fn create_consumer_group(
        &self,
        stream_key: &str,
        group: &str,
        start: StartPosition,
        must_not_exist: bool,
    ) -> Result<(), Error> {
        let mut streams = self.streams.lock().unwrap();
        let stream = streams.entry(stream_key.to_string()).or_default();

        if stream.groups.contains_key(group) {
            if must_not_exist {
                return Err(Error::new(ErrorKind::GroupExists));
            }
            return Ok(());
        }

        let cursor = match start {
            StartPosition::Beginning => 0,
            StartPosition::Tail => stream.next_seq,
        };
        stream.groups.insert(
            group.to_string(),
            Group {
                cursor,
                pending: HashSet::new(),
            },
        );
        Ok(())
    }

    async fn read_new(
        &self,
        group: &str,
        _consumer: &str,
        stream_key: &str,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<LogEntry>, Error> {
        let deadline = Instant::now() + block;

        loop {
            // Arm the notification before checking, so an append landing
            // between the check and the await still wakes this reader.
            let notified = self.appended.notified();

            {
                let mut streams = self.streams.lock().unwrap();
                if let Some(stream) = streams.get_mut(stream_key) {
                    if !stream.groups.contains_key(group) {
                        return Err(Error::new(ErrorKind::GroupMissing));
                    }
                    let batch = Self::drain_new(stream, group, max_count);
                    if !batch.is_empty() {
                        return Ok(batch);
                    }
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }

    async fn acknowledge(
        &self,
        stream_key: &str,
        group: &str,
        entry_id: &str,
    ) -> Result<(), Error> {
        let mut streams = self.streams.lock().unwrap();
        let group = streams
            .get_mut(stream_key)
            .and_then(|s| s.groups.get_mut(group))
            .ok_or_else(|| Error::new(ErrorKind::GroupMissing))?;

        group.pending.remove(entry_id);
        Ok(())
    }

    async fn destroy_consumer_group(&self, stream_key: &str, group: &str) -> Result<(), Error> {
        let mut streams = self.streams.lock().unwrap();
        if let Some(stream) = streams.get_mut(stream_key) {
            stream.groups.remove(group);
        }
        Ok(())
    }
}
