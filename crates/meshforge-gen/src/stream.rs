//! Server-sent event framing
//!
//! Splits a `text/event-stream` body into events. Field handling follows the
//! EventSource rules: `data:` lines accumulate joined by `\n`, `event:` and
//! `id:` set metadata, lines starting with `:` are comments, and a blank line
//! dispatches. A trailing event without a blank line is still dispatched when
//! the stream ends.

use std::io::{self, BufRead};

/// One dispatched event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type; `None` means the default `message` type
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
}

impl SseEvent {
    /// Whether the backend flagged this event as an error
    pub fn is_error(&self) -> bool {
        self.event.as_deref() == Some("error")
    }
}

/// Iterator over the events of an event-stream body
pub struct EventReader<R> {
    reader: R,
    line: String,
    pending: SseEvent,
    has_data: bool,
    done: bool,
}

impl<R: BufRead> EventReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            pending: SseEvent::default(),
            has_data: false,
            done: false,
        }
    }

    fn take_pending(&mut self) -> Option<SseEvent> {
        let mut event = std::mem::take(&mut self.pending);
        let had_data = std::mem::replace(&mut self.has_data, false);
        if !had_data {
            return None;
        }
        if event.data.ends_with('\n') {
            event.data.pop();
        }
        Some(event)
    }

    fn apply_field(&mut self, line: &str) {
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                self.pending.data.push_str(value);
                self.pending.data.push('\n');
                self.has_data = true;
            }
            "event" => self.pending.event = Some(value.to_string()),
            "id" => self.pending.id = Some(value.to_string()),
            // retry and unknown fields are ignored
            _ => {}
        }
    }
}

impl<R: BufRead> Iterator for EventReader<R> {
    type Item = io::Result<SseEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => {
                    self.done = true;
                    return self.take_pending().map(Ok);
                }
                Ok(_) => {
                    let line = self.line.trim_end_matches(['\r', '\n']).to_string();
                    if line.is_empty() {
                        if let Some(event) = self.take_pending() {
                            return Some(Ok(event));
                        }
                    } else if !line.starts_with(':') {
                        self.apply_field(&line);
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}
