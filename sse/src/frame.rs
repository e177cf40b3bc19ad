//! SSE wire-format encoding and incremental frame reassembly.

use bytes::{Bytes, BytesMut};

/// The blank line that terminates every SSE frame.
pub const FRAME_TERMINATOR: &[u8] = b"\n\n";

/// One complete Server-Sent-Events message.
///
/// Wire form for events: optional `id:` line, `event:` line, `data:` line,
/// blank-line terminator. Comment frames are a single leading-colon line and
/// carry no event or data; intermediaries see traffic, clients ignore them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Event {
        id: Option<String>,
        name: String,
        data: String,
    },
    Comment(String),
}

impl Frame {
    pub fn event(name: impl Into<String>, data: impl Into<String>) -> Self {
        Frame::Event {
            id: None,
            name: name.into(),
            data: data.into(),
        }
    }

    pub fn event_with_id(
        id: impl Into<String>,
        name: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Frame::Event {
            id: Some(id.into()),
            name: name.into(),
            data: data.into(),
        }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Frame::Comment(text.into())
    }

    /// Encode to the exact wire form, terminator included.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = String::new();
        match self {
            Frame::Event { id, name, data } => {
                if let Some(id) = id {
                    out.push_str("id: ");
                    out.push_str(id);
                    out.push('\n');
                }
                out.push_str("event: ");
                out.push_str(name);
                out.push_str("\ndata: ");
                out.push_str(data);
                out.push_str("\n\n");
            }
            Frame::Comment(text) => {
                out.push_str(": ");
                out.push_str(text);
                out.push_str("\n\n");
            }
        }
        Bytes::from(out)
    }
}

/// Incremental SSE frame parser for the proxy's upstream byte stream.
///
/// Accumulates arbitrary chunks and yields one complete frame (terminator
/// included) at a time. A frame is never emitted before its full terminator
/// has been observed; partial frames stay buffered. The scan position is
/// persisted across pushes so already-inspected bytes are not rescanned.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: BytesMut,
    /// Offset of the first byte not yet ruled out as a terminator start.
    scan_pos: usize,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of upstream bytes. Call [`Self::next_frame`] until it
    /// returns `None` after each push.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Slice off the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        // The terminator may straddle the previous scan boundary.
        let from = self.scan_pos.saturating_sub(1);

        match find_terminator(&self.buf, from) {
            Some(pos) => {
                let frame = self.buf.split_to(pos + FRAME_TERMINATOR.len()).freeze();
                self.scan_pos = 0;
                Some(frame)
            }
            None => {
                self.scan_pos = self.buf.len();
                None
            }
        }
    }

    /// Drain any non-empty trailing partial frame. Used on upstream EOF to
    /// flush whatever arrived before the connection closed.
    pub fn take_remainder(&mut self) -> Option<Bytes> {
        self.scan_pos = 0;
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf.split().freeze())
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

fn find_terminator(buf: &[u8], from: usize) -> Option<usize> {
    if buf.len() < FRAME_TERMINATOR.len() {
        return None;
    }
    (from..=buf.len() - FRAME_TERMINATOR.len())
        .find(|&i| &buf[i..i + FRAME_TERMINATOR.len()] == FRAME_TERMINATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_frame_wire_form() {
        let frame = Frame::event("product.updated", r#"{"id":42}"#);
        assert_eq!(
            frame.to_bytes(),
            Bytes::from("event: product.updated\ndata: {\"id\":42}\n\n")
        );
    }

    #[test]
    fn event_frame_with_id_wire_form() {
        let frame = Frame::event_with_id("7", "product.created", "{}");
        assert_eq!(
            frame.to_bytes(),
            Bytes::from("id: 7\nevent: product.created\ndata: {}\n\n")
        );
    }

    #[test]
    fn comment_frame_wire_form() {
        assert_eq!(
            Frame::comment("heartbeat").to_bytes(),
            Bytes::from(": heartbeat\n\n")
        );
    }

    fn sample_stream() -> Vec<Bytes> {
        vec![
            Frame::event("connected", r#"{"session_id":"s1"}"#).to_bytes(),
            Frame::comment("heartbeat").to_bytes(),
            Frame::event_with_id("3", "product.updated", r#"{"id":42,"price":"19.99"}"#)
                .to_bytes(),
            Frame::event("timestamp", r#"{"counter":1}"#).to_bytes(),
        ]
    }

    fn assemble(stream: &[u8], chunk_size: usize) -> Vec<Bytes> {
        let mut assembler = FrameAssembler::new();
        let mut frames = Vec::new();
        for chunk in stream.chunks(chunk_size) {
            assembler.push(chunk);
            while let Some(frame) = assembler.next_frame() {
                frames.push(frame);
            }
        }
        assert!(assembler.is_empty());
        frames
    }

    #[test]
    fn reassembly_is_chunking_invariant() {
        let frames = sample_stream();
        let stream: Vec<u8> = frames.iter().flat_map(|f| f.to_vec()).collect();

        // Every chunk size from single bytes up to the whole stream must
        // reproduce the identical frame sequence.
        for chunk_size in 1..=stream.len() {
            let reassembled = assemble(&stream, chunk_size);
            assert_eq!(
                reassembled, frames,
                "chunk size {chunk_size} altered the frame sequence"
            );
        }
    }

    #[test]
    fn terminator_split_across_pushes() {
        let mut assembler = FrameAssembler::new();
        assembler.push(b"event: a\ndata: 1\n");
        assert!(assembler.next_frame().is_none());
        assembler.push(b"\n");
        assert_eq!(
            assembler.next_frame().unwrap(),
            Bytes::from("event: a\ndata: 1\n\n")
        );
    }

    #[test]
    fn partial_frame_is_never_emitted() {
        let mut assembler = FrameAssembler::new();
        assembler.push(b"event: product.created\ndata: {\"id\"");
        assert!(assembler.next_frame().is_none());
        assert!(!assembler.is_empty());
    }

    #[test]
    fn remainder_flushes_trailing_partial() {
        let mut assembler = FrameAssembler::new();
        assembler.push(b"event: a\ndata: 1\n\nevent: b\ndata:");
        assert!(assembler.next_frame().is_some());
        assert_eq!(
            assembler.take_remainder().unwrap(),
            Bytes::from("event: b\ndata:")
        );
        assert!(assembler.take_remainder().is_none());
    }

    #[test]
    fn back_to_back_frames_in_one_push() {
        let mut assembler = FrameAssembler::new();
        assembler.push(b"event: a\ndata: 1\n\nevent: b\ndata: 2\n\n");
        assert_eq!(
            assembler.next_frame().unwrap(),
            Bytes::from("event: a\ndata: 1\n\n")
        );
        assert_eq!(
            assembler.next_frame().unwrap(),
            Bytes::from("event: b\ndata: 2\n\n")
        );
        assert!(assembler.next_frame().is_none());
        assert!(assembler.is_empty());
    }
}
