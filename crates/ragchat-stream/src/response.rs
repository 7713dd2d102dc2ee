use std::pin::Pin;

use futures::Stream;
use tokio_stream::StreamExt;

use crate::decoder::decode;
use crate::error::Error;
use crate::stream::{ByteStream, StreamEvent};

/// A live answer stream from the backend.
///
/// Consume it event-by-event via [`events()`](Response::events), or collect
/// the full answer with [`into_result()`](Response::into_result).
pub struct Response {
    inner: Pin<Box<dyn Stream<Item = Result<StreamEvent, Error>> + Send>>,
}

impl Response {
    pub fn new(stream: impl Stream<Item = Result<StreamEvent, Error>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Decode a raw response body.
    pub fn from_body(body: ByteStream) -> Self {
        Self::new(decode(body))
    }

    /// Consume the response as an async stream of events.
    pub fn events(self) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, Error>> + Send>> {
        self.inner
    }

    /// Collect the whole stream into a single answer.
    ///
    /// `[ERROR]` payloads are gathered rather than treated as failures; only
    /// transport errors abort collection.
    pub async fn into_result(self) -> Result<Answer, Error> {
        let mut answer = Answer::default();

        let mut stream = self.inner;
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Token(token) => {
                    answer.text.push_str(&token);
                    answer.tokens += 1;
                }
                StreamEvent::Error(message) => answer.errors.push(message),
                StreamEvent::Done => answer.done = true,
            }
        }

        Ok(answer)
    }
}

/// The collected result of an answer stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub tokens: usize,
    pub errors: Vec<String>,
    /// False when the transport closed without `[DONE]`.
    pub done: bool,
}
