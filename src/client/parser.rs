//! Incremental server-sent events parser.
//!
//! Bytes arrive from the update stream in arbitrary chunks. The parser buffers
//! them, splits complete lines, and emits an [`SseEvent`] every time a blank
//! line closes an event block.
//!
//! # Line Format
//!
//! | Line | Effect |
//! |------|--------|
//! | `event: <name>` | Sets the event name (default `message`) |
//! | `data: <text>` | Appends a data line |
//! | `id: <id>` | Sets the last event id |
//! | `: <comment>` | Ignored (keep-alive) |
//! | blank | Dispatches the pending event |
//!
//! Lines may end in `\n`, `\r\n` or `\r`, and a `\r\n` pair may be split
//! across two chunks. A line longer than [`MAX_LINE_LEN`] is dropped whole.
//!
//! # Examples
//!
//! ```
//! use resilient_client::client::EventParser;
//!
//! let mut parser = EventParser::new();
//! assert!(parser.feed(b"event: job_update\ndata: [").is_empty());
//!
//! let events = parser.feed(b"]\n\n");
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].event, "job_update");
//! assert_eq!(events[0].data, "[]");
//! ```

use bytes::{Buf, BytesMut};

/// Event name used when a block has no `event:` line.
pub const DEFAULT_EVENT: &str = "message";

/// Longest line buffered while waiting for its terminator.
pub const MAX_LINE_LEN: usize = 1024 * 1024;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name.
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
    /// Last event id seen on the stream, if any.
    pub id: Option<String>,
}

/// Streaming parser for `text/event-stream` bodies.
#[derive(Debug)]
pub struct EventParser {
    /// Bytes not yet split into lines
    buffer: BytesMut,
    /// Name from the pending block's `event:` line
    event: Option<String>,
    /// Data lines of the pending block, each followed by `\n`
    data: String,
    /// Persists across events, per the event-stream format
    last_event_id: Option<String>,
    /// Previous chunk ended in `\r`; a leading `\n` belongs to it
    skip_lf: bool,
    /// Prefix of `buffer` already known to hold no terminator
    scanned: usize,
    /// Inside an over-long line; drop bytes up to its terminator
    discarding: bool,
}

impl EventParser {
    /// Create a new parser
    pub fn new() -> Self {
        EventParser {
            buffer: BytesMut::with_capacity(8192),
            event: None,
            data: String::new(),
            last_event_id: None,
            skip_lf: false,
            scanned: 0,
            discarding: false,
        }
    }

    /// Feed bytes, returning every event completed by them.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(line) = self.next_line() {
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        events
    }

    /// Last event id seen, for `Last-Event-ID` on reconnect.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    fn next_line(&mut self) -> Option<String> {
        loop {
            if self.skip_lf {
                match self.buffer.first() {
                    Some(b'\n') => {
                        self.buffer.advance(1);
                        self.skip_lf = false;
                    }
                    Some(_) => self.skip_lf = false,
                    None => return None,
                }
            }

            let found = self.buffer[self.scanned..]
                .iter()
                .position(|b| *b == b'\n' || *b == b'\r');
            let Some(offset) = found else {
                self.scanned = self.buffer.len();
                if self.buffer.len() > MAX_LINE_LEN {
                    tracing::warn!(len = self.buffer.len(), "discarding over-long event-stream line");
                    self.buffer.clear();
                    self.scanned = 0;
                    self.discarding = true;
                }
                return None;
            };

            let end = self.scanned + offset;
            self.scanned = 0;
            let line = self.buffer.split_to(end);
            let terminator = self.buffer[0];
            self.buffer.advance(1);

            if terminator == b'\r' {
                match self.buffer.first() {
                    Some(b'\n') => self.buffer.advance(1),
                    Some(_) => {}
                    None => self.skip_lf = true,
                }
            }

            if self.discarding {
                self.discarding = false;
                continue;
            }

            return Some(String::from_utf8_lossy(&line).into_owned());
        }
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            _ => {}
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }

        let mut data = std::mem::take(&mut self.data);
        data.pop();

        Some(SseEvent {
            event: event
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
            id: self.last_event_id.clone(),
        })
    }
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new()
    }
}
