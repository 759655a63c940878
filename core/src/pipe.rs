//! Flow-controlled byte pipe for streamed response bodies.
//!
//! The producer end stays with the connection; the consumer end is attached
//! to the `HttpResponse` and owned by the collaborator. Capacity is counted in
//! chunks. A full pipe makes `try_write` report would-block and hand the chunk
//! back unchanged so it can be retried as-is.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::NetError;

type Item = Result<Bytes, NetError>;

/// Create a connected producer/consumer pair holding up to `capacity` chunks.
pub fn body_pipe(capacity: usize) -> (BodyProducer, BodyStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (BodyProducer { tx }, BodyStream { rx })
}

/// Outcome of a failed `try_write`.
#[derive(Debug, PartialEq, Eq)]
pub enum TryWriteError {
    /// The pipe is full; the untouched chunk is returned.
    WouldBlock(Bytes),
    /// The consumer went away.
    PeerClosed,
}

/// What `wait_writable` observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Writable,
    PeerClosed,
}

/// Write end. Dropping it signals end-of-stream to the consumer.
#[derive(Debug)]
pub struct BodyProducer {
    tx: mpsc::Sender<Item>,
}

impl BodyProducer {
    /// Queue `chunk` without waiting. Returns the number of bytes accepted,
    /// which is always the whole chunk.
    pub fn try_write(&self, chunk: Bytes) -> Result<usize, TryWriteError> {
        let len = chunk.len();
        match self.tx.try_send(Ok(chunk)) {
            Ok(()) => Ok(len),
            Err(TrySendError::Full(Ok(chunk))) => Err(TryWriteError::WouldBlock(chunk)),
            Err(TrySendError::Full(Err(_))) | Err(TrySendError::Closed(_)) => {
                Err(TryWriteError::PeerClosed)
            }
        }
    }

    /// Wait until there is room for another chunk or the consumer is gone.
    pub async fn wait_writable(&self) -> Readiness {
        match self.tx.reserve().await {
            Ok(permit) => {
                drop(permit);
                Readiness::Writable
            }
            Err(_) => Readiness::PeerClosed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the consumer has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Terminate the stream with an error instead of a clean end-of-stream.
    pub async fn fail(self, error: NetError) {
        // The consumer may already be gone; nothing left to tell it then.
        let _ = self.tx.send(Err(error)).await;
    }

    /// Like `fail`, but gives up instead of waiting when the pipe is full.
    pub fn try_fail(self, error: NetError) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(Err(error)) {
            log::warn!("body pipe full, consumer sees a truncated stream");
        }
    }
}

/// Read end of a streamed body.
#[derive(Debug)]
pub struct BodyStream {
    rx: mpsc::Receiver<Item>,
}

impl BodyStream {
    /// Next chunk, `None` at end-of-stream.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, NetError>> {
        self.rx.recv().await
    }

    /// Collect the remaining body.
    pub async fn read_to_end(mut self) -> Result<Vec<u8>, NetError> {
        let mut body = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            body.extend_from_slice(&chunk?);
        }
        Ok(body)
    }
}
