use std::time::Duration;

use bytes::Bytes;
use ragchat_stream::{ByteStream, Error};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Wrap a response body so that cancellation and an idle timeout are
/// checked between chunks. Either one ends the stream with an error, which
/// drops the underlying body.
pub(crate) fn guard(body: ByteStream, cancel: CancellationToken, idle: Option<Duration>) -> ByteStream {
    Box::pin(async_stream::stream! {
        let mut body = body;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                next = next_chunk(&mut body, idle) => next,
            };

            match next {
                Ok(Some(chunk)) => yield Ok(chunk),
                Ok(None) => break,
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    })
}

async fn next_chunk(body: &mut ByteStream, idle: Option<Duration>) -> Result<Option<Bytes>, Error> {
    let next = match idle {
        Some(limit) => tokio::time::timeout(limit, body.next())
            .await
            .map_err(|_| Error::Timeout(limit))?,
        None => body.next().await,
    };
    next.transpose()
}
