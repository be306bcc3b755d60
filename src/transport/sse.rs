//! Incremental `text/event-stream` decoding.
//!
//! Both streaming peer calls and MCP streamable-HTTP responses deliver
//! JSON-RPC messages as server-sent events. Chunks arrive at arbitrary byte
//! boundaries, so the decoder buffers until a blank line closes an event.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::context::InvocationContext;
use crate::error::{BridgeError, Result};

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub id: Option<String>,
    pub event: Option<String>,
    pub data: String,
}

/// Buffers raw bytes and yields complete events.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = find_blank_line(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(event) = parse_event(&String::from_utf8_lossy(&raw[..end])) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let raw = std::mem::take(&mut self.buffer);
        parse_event(&String::from_utf8_lossy(&raw))
    }
}

fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

fn parse_event(raw: &str) -> Option<SseEvent> {
    let mut event = SseEvent::default();
    let mut has_data = false;

    for line in raw.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.find(':') {
            Some(pos) => {
                let value = &line[pos + 1..];
                (&line[..pos], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        match field {
            "id" => event.id = Some(value.to_string()),
            "event" => event.event = Some(value.to_string()),
            "data" => {
                if has_data {
                    event.data.push('\n');
                }
                event.data.push_str(value);
                has_data = true;
            }
            _ => {}
        }
    }

    has_data.then_some(event)
}

struct StreamState {
    bytes: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
    ctx: InvocationContext,
    peer: String,
    done: bool,
}

/// Turn a response byte stream into an event stream that ends with
/// `Cancelled`/`DeadlineExceeded` when `ctx` fires.
pub fn event_stream<S>(
    bytes: S,
    peer: impl Into<String>,
    ctx: InvocationContext,
) -> BoxStream<'static, Result<SseEvent>>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let state = StreamState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        ctx,
        peer: peer.into(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.done {
                return None;
            }
            tokio::select! {
                biased;
                err = state.ctx.done() => {
                    state.done = true;
                    return Some((Err(err), state));
                }
                chunk = state.bytes.next() => match chunk {
                    Some(Ok(chunk)) => {
                        let events = state.decoder.push(&chunk);
                        state.pending.extend(events);
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        let err = BridgeError::fetch(state.peer.clone(), e);
                        return Some((Err(err), state));
                    }
                    None => {
                        state.pending.extend(state.decoder.finish());
                        state.done = true;
                    }
                },
            }
        }
    })
    .boxed()
}
