//! Incremental decoder for the answer stream.
//!
//! The backend frames its output as `text/event-stream` records separated by
//! a blank line. Only `data: ` lines carry a payload; everything else in a
//! record is ignored. Chunks arrive with arbitrary boundaries, so records are
//! only split after accumulation.

use bytes::Bytes;
use futures::Stream;
use tokio_stream::StreamExt;

use crate::error::Error;
use crate::stream::StreamEvent;

const RECORD_SEPARATOR: &[u8] = b"\n\n";
const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";
const ERROR_SENTINEL: &str = "[ERROR]";

/// Turns raw body chunks into [`StreamEvent`]s.
///
/// One decoder per stream. The buffer holds bytes rather than text so that a
/// UTF-8 sequence split across two chunks is decoded only once it is whole.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Offset into `buffer` before which no separator can start.
    scan_from: usize,
    done: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `[DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of bytes waiting for a record separator.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one chunk and return every event completed by it, in order.
    ///
    /// After `Done` has been returned, further chunks are ignored.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        self.buffer.extend_from_slice(chunk);

        let mut start = 0;
        let mut search_from = self.scan_from;
        while let Some(offset) = find_separator(&self.buffer[search_from..]) {
            let end = search_from + offset;
            let record = String::from_utf8_lossy(&self.buffer[start..end]);
            let finished = parse_record(&record, &mut events);
            start = end + RECORD_SEPARATOR.len();
            search_from = start;

            if finished {
                self.done = true;
                self.buffer.clear();
                self.scan_from = 0;
                return events;
            }
        }

        self.buffer.drain(..start);
        // The last byte may be the first half of a separator.
        self.scan_from = self
            .buffer
            .len()
            .saturating_sub(RECORD_SEPARATOR.len() - 1);
        events
    }

    /// Signal end of transport. A trailing partial record is discarded, never
    /// emitted as a token. Returns the number of discarded bytes.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffer.len();
        self.buffer.clear();
        self.scan_from = 0;
        discarded
    }
}

fn find_separator(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(RECORD_SEPARATOR.len())
        .position(|window| window == RECORD_SEPARATOR)
}

/// Parse one complete record. Returns true if it carried `[DONE]`.
fn parse_record(record: &str, events: &mut Vec<StreamEvent>) -> bool {
    for line in record.split('\n') {
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            continue;
        };

        if payload == DONE_SENTINEL {
            events.push(StreamEvent::Done);
            return true;
        }

        if payload.starts_with(ERROR_SENTINEL) {
            events.push(StreamEvent::Error(payload.to_string()));
        } else {
            events.push(StreamEvent::Token(payload.to_string()));
        }
    }
    false
}

/// Decode a stream of body chunks lazily.
///
/// Transport errors are forwarded and end the stream. The stream also ends
/// right after `Done`, without polling `chunks` again.
pub fn decode<S>(chunks: S) -> impl Stream<Item = Result<StreamEvent, Error>> + Send
where
    S: Stream<Item = Result<Bytes, Error>> + Send + 'static,
{
    async_stream::try_stream! {
        let mut chunks = Box::pin(chunks);
        let mut decoder = FrameDecoder::new();

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            for event in decoder.push(&chunk) {
                yield event;
            }
            if decoder.is_done() {
                break;
            }
        }

        if !decoder.is_done() {
            let discarded = decoder.finish();
            if discarded > 0 {
                tracing::debug!(discarded, "stream closed mid-record, dropping partial record");
            }
        }
    }
}
