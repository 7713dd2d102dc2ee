use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

use crate::error::Error;

/// Raw body chunks as they arrive from the transport. Chunk boundaries carry
/// no meaning.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// A logical event decoded from the answer stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A chunk of answer text, verbatim.
    Token(String),

    /// A `[ERROR]` sentinel. Carries the full payload, prefix included.
    /// Non-fatal: more events may follow.
    Error(String),

    /// The `[DONE]` sentinel. Nothing follows it.
    Done,
}
