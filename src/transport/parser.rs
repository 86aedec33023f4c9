//! Server-sent-event line parser.
//!
//! Incremental, state-machine based parser for `text/event-stream` bodies.
//! Chunks arrive in whatever sizes the network delivers; the parser buffers
//! them and hands out one frame at a time, so a consumer can finish handling
//! event N before event N+1 is even split out of the buffer.
//!
//! # Line Rules
//!
//! Each `\n`-terminated line is trimmed, then:
//!
//! | Line | Effect |
//! |------|--------|
//! | blank | ignored (separator / heartbeat) |
//! | `:...` | ignored (comment) |
//! | `data: [DONE]` | end of stream |
//! | `data: <text>` | event with payload `<text>` |
//! | anything else (`event:`, `id:`, `retry:`) | ignored |
//!
//! Bytes after the last newline are never interpreted; a body that ends
//! without a trailing newline loses that fragment.
//!
//! # Examples
//!
//! ```
//! use rest_chain::transport::{EventParser, SseFrame};
//!
//! let mut parser = EventParser::new();
//! parser.feed(b": keep-alive\n\ndata: {\"a\":1}\nda");
//! assert_eq!(parser.next_frame(), Some(SseFrame::Data("{\"a\":1}".to_string())));
//! assert_eq!(parser.next_frame(), None);
//!
//! parser.feed(b"ta: [DONE]\n");
//! assert_eq!(parser.next_frame(), Some(SseFrame::Done));
//! ```

use crate::error::Result;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

/// Parse state of an [`EventParser`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Accepting lines
    Streaming,
    /// `[DONE]` seen; further input is ignored
    Done,
}

/// One interpreted line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Payload of a `data:` line
    Data(String),
    /// End-of-stream sentinel
    Done,
}

/// Incremental parser for server-sent-event bodies
#[derive(Debug)]
pub struct EventParser {
    /// Bytes received but not yet split into lines
    buffer: BytesMut,
    state: ParseState,
}

impl EventParser {
    /// Create a new parser
    pub fn new() -> Self {
        EventParser {
            buffer: BytesMut::with_capacity(8192),
            state: ParseState::Streaming,
        }
    }

    /// Append bytes from the stream
    pub fn feed(&mut self, data: &[u8]) {
        if self.state == ParseState::Streaming {
            self.buffer.extend_from_slice(data);
        }
    }

    /// Next event or sentinel from the complete lines buffered so far
    pub fn next_frame(&mut self) -> Option<SseFrame> {
        while self.state == ParseState::Streaming {
            let end = self.buffer.iter().position(|b| *b == b'\n')?;
            let line = self.buffer.split_to(end + 1);
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();

            if text.is_empty() || text.starts_with(':') {
                continue;
            }
            if let Some(data) = text.strip_prefix("data: ") {
                if data == "[DONE]" {
                    self.state = ParseState::Done;
                    self.buffer.clear();
                    return Some(SseFrame::Done);
                }
                return Some(SseFrame::Data(data.to_string()));
            }
        }
        None
    }

    /// Get current parse state
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Bytes buffered but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Pulls events out of a chunked body, reading only as far as needed
///
/// Each call to [`EventReader::next_event`] reads more chunks only when the
/// buffered lines hold no further event.
pub struct EventReader<S> {
    body: S,
    parser: EventParser,
}

impl<S> EventReader<S>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    /// Wrap a body stream
    pub fn new(body: S) -> Self {
        EventReader {
            body,
            parser: EventParser::new(),
        }
    }

    /// Next event payload; `None` on `[DONE]` or end of body
    pub async fn next_event(&mut self) -> Option<Result<String>> {
        loop {
            match self.parser.next_frame() {
                Some(SseFrame::Data(data)) => return Some(Ok(data)),
                Some(SseFrame::Done) => return None,
                None => {}
            }
            match self.body.next().await? {
                Ok(chunk) => self.parser.feed(&chunk),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
