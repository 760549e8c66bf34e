//! Bounded buffering between upstream SSE decoding and the consumer.
//!
//! A fast upstream feeding a slow consumer (rate-limited client, busy
//! request handler) would otherwise buffer an entire completion in memory.
//! Wrapping the decoded chunk stream in a bounded `tokio::sync::mpsc`
//! channel caps that: the producer task parks when the channel is full and
//! stops when the consumer drops the stream.

use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;

use crate::Result;

/// Chunks buffered between the decoder task and the consumer.
pub(crate) const DEFAULT_STREAM_BUFFER: usize = 64;

/// Drive `inner` from a spawned task, handing items over a bounded channel.
///
/// Requires a tokio runtime context.
pub(crate) fn bounded_stream<T: Send + 'static>(
    inner: Pin<Box<dyn Stream<Item = Result<T>> + Send>>,
    buffer_size: usize,
) -> Pin<Box<dyn Stream<Item = Result<T>> + Send>> {
    let (tx, rx) = tokio::sync::mpsc::channel(buffer_size);

    tokio::spawn(async move {
        let mut inner = inner;
        while let Some(item) = inner.next().await {
            if tx.send(item).await.is_err() {
                break; // consumer dropped the stream
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn passes_items_through_in_order() {
        let inner = stream::iter((0..10).map(Ok));
        let mut bounded = bounded_stream(Box::pin(inner), 2);

        let mut seen = Vec::new();
        while let Some(item) = bounded.next().await {
            seen.push(item.unwrap());
        }
        assert_eq!(seen, (0..10).collect::<Vec<i32>>());
    }

    #[tokio::test]
    async fn dropping_the_consumer_stops_the_producer() {
        let (probe_tx, mut probe_rx) = tokio::sync::mpsc::unbounded_channel();
        let inner = stream::unfold(probe_tx, |tx| async move {
            tx.send(()).ok()?;
            Some((Ok(String::new()), tx))
        });

        let bounded = bounded_stream(Box::pin(inner), 1);
        drop(bounded);

        // The producer fills the buffer then parks; after the drop it
        // observes the closed channel and exits, closing the probe.
        while probe_rx.recv().await.is_some() {}
    }
}
