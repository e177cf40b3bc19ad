//! Shared test doubles for the streamer unit tests.

use crate::sink::{FrameSink, WriteError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;

/// A sink whose per-write outcomes are scripted up front.
///
/// Each write consumes the next scripted result (`Ok` once the script is
/// exhausted). Successful writes are recorded so tests can assert on the
/// exact frame sequence the client would have observed.
pub(crate) struct ScriptedSink {
    pub frames: Vec<Bytes>,
    script: VecDeque<Result<(), WriteError>>,
    closed: bool,
}

impl ScriptedSink {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            script: VecDeque::new(),
            closed: false,
        }
    }

    /// Queue outcomes for the next writes, in order.
    pub fn with_script(mut self, script: impl IntoIterator<Item = Result<(), WriteError>>) -> Self {
        self.script = script.into_iter().collect();
        self
    }

    /// Report the peer as gone from now on.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn frames_utf8(&self) -> Vec<String> {
        self.frames
            .iter()
            .map(|f| String::from_utf8(f.to_vec()).unwrap())
            .collect()
    }

    /// Event names of recorded frames, in write order. Comments appear as ":".
    pub fn event_names(&self) -> Vec<String> {
        self.frames_utf8()
            .iter()
            .map(|frame| {
                frame
                    .lines()
                    .find_map(|line| line.strip_prefix("event: "))
                    .unwrap_or(":")
                    .to_string()
            })
            .collect()
    }
}

#[async_trait]
impl FrameSink for ScriptedSink {
    async fn write_frame(&mut self, frame: Bytes) -> Result<(), WriteError> {
        if self.closed {
            return Err(WriteError::Closed);
        }
        match self.script.pop_front() {
            Some(Ok(())) | None => {
                self.frames.push(frame);
                Ok(())
            }
            Some(Err(err)) => Err(err),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
