//! Forwarding of completion chunks to the response body.
//!
//! A spawned producer task reads the upstream chunk stream and pushes encoded
//! text into a single-slot channel; the receiving half is the outbound body.
//! The producer stops as soon as the receiver goes away.

use crate::error::ProviderError;
use crate::providers::ChunkStream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

/// Outbound body: UTF-8 text fragments, or the error that aborted the stream.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProviderError>> + Send>>;

/// Forward completion text as bytes, one fragment per non-empty chunk.
///
/// Must be called within a Tokio runtime.
pub fn forward_tokens(upstream: ChunkStream) -> TokenStream {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(produce(upstream, tx));
    Box::pin(ReceiverStream::new(rx))
}

async fn produce(mut upstream: ChunkStream, tx: mpsc::Sender<Result<Bytes, ProviderError>>) {
    let mut fragments = 0usize;
    let mut bytes_sent = 0usize;

    loop {
        let item = tokio::select! {
            _ = tx.closed() => {
                debug!(fragments, "Receiver dropped; abandoning completion stream");
                return;
            }
            item = upstream.next() => item,
        };

        match item {
            Some(Ok(chunk)) => {
                let Some(text) = chunk.text() else {
                    continue;
                };
                let payload = Bytes::copy_from_slice(text.as_bytes());
                let len = payload.len();
                if tx.send(Ok(payload)).await.is_err() {
                    debug!(fragments, "Receiver dropped; abandoning completion stream");
                    return;
                }
                fragments += 1;
                bytes_sent += len;
            }
            Some(Err(e)) => {
                error!(error = %e, fragments, "Streaming error");
                let _ = tx.send(Err(e)).await;
                return;
            }
            None => {
                debug!(fragments, bytes = bytes_sent, "Completion stream finished");
                return;
            }
        }
    }
}
