//! Streaming backpressure via bounded channels.
//!
//! A vendor can push chunks faster than the caller reads them. Routing the
//! parts through a bounded `tokio::sync::mpsc::channel` makes the producer
//! wait for the consumer instead of buffering without limit.
//!
//! Applied to every `do_stream` result handed out through
//! [`ProviderRegistry`](crate::providers::ProviderRegistry). The buffer size
//! defaults to [`DEFAULT_STREAM_BUFFER`] and is configurable per registry.

use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::Result;

/// Default number of parts buffered between producer and consumer.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Wrap a stream in a bounded channel for backpressure.
///
/// Spawns a task that forwards `inner` into a channel of `buffer_size`
/// slots (at least one). The task stops as soon as the consumer drops the
/// returned stream, even while waiting on the vendor, which also drops the
/// underlying HTTP response.
///
/// Requires a tokio runtime context.
pub fn bounded_stream<T: Send + 'static>(
    inner: Pin<Box<dyn Stream<Item = Result<T>> + Send>>,
    buffer_size: usize,
) -> Pin<Box<dyn Stream<Item = Result<T>> + Send>> {
    let (tx, rx) = tokio::sync::mpsc::channel(buffer_size.max(1));

    tokio::spawn(async move {
        let mut inner = inner;
        loop {
            let next = tokio::select! {
                _ = tx.closed() => {
                    debug!("stream consumer dropped, stopping producer");
                    break;
                }
                next = inner.next() => next,
            };
            let Some(item) = next else { break };
            if tx.send(item).await.is_err() {
                break;
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}
