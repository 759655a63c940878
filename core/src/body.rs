//! Body delivery engine.
//!
//! # Design
//! Both strategies start from the same read buffer, which already holds any
//! body bytes that arrived together with the headers. Neither honours
//! `Content-Length` or chunked framing: the body ends when the peer closes
//! the connection, which every request asks for with `Connection: close`.
//!
//! - Buffered: read to EOF, copy everything into one exactly-sized
//!   allocation, return the finished response.
//! - Streamed: hand the response (headers plus a `BodyStream`) to the
//!   delegate first, then push the body through the pipe in bounded chunks,
//!   waiting whenever the consumer falls behind.

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

use crate::config::TransportConfig;
use crate::connection::LoaderDelegate;
use crate::error::NetError;
use crate::http::{HttpResponse, ResponseBody, ResponseHead};
use crate::pipe::{body_pipe, BodyProducer, Readiness, TryWriteError};

/// A TLS peer that closes without `close_notify` surfaces as
/// `UnexpectedEof`; for a read-until-close body that is the normal end.
pub(crate) fn is_end_of_body(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::UnexpectedEof
}

/// Read into `read_buf` until the peer closes the connection.
pub(crate) async fn read_to_close<S>(
    stream: &mut S,
    read_buf: &mut BytesMut,
    config: &TransportConfig,
) -> Result<(), NetError>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(limit) = config.max_buffered_body_bytes {
            if read_buf.len() > limit {
                log::debug!("buffered body exceeds {limit} bytes");
                return Err(NetError::BufferAllocationFailed(read_buf.len()));
            }
        }
        read_buf.reserve(config.read_buffer_size);
        match stream.read_buf(read_buf).await {
            Ok(0) => return Ok(()),
            Ok(_) => {}
            Err(e) if is_end_of_body(&e) => return Ok(()),
            Err(e) => return Err(NetError::TransportFailed(e.to_string())),
        }
    }
}

/// Copy the whole read buffer into a destination of exactly its size.
pub fn materialize(read_buf: &mut BytesMut) -> Result<Bytes, NetError> {
    let size = read_buf.len();
    let mut destination = Vec::new();
    destination
        .try_reserve_exact(size)
        .map_err(|_| NetError::BufferAllocationFailed(size))?;
    destination.extend_from_slice(read_buf);
    read_buf.clear();
    Ok(Bytes::from(destination))
}

/// Buffered mode: the returned response owns the complete body.
pub(crate) async fn deliver_buffered<S>(
    stream: &mut S,
    read_buf: &mut BytesMut,
    head: ResponseHead,
    config: &TransportConfig,
) -> Result<HttpResponse, NetError>
where
    S: AsyncRead + Unpin,
{
    read_to_close(stream, read_buf, config).await?;
    let body = materialize(read_buf)?;
    Ok(head.into_response(ResponseBody::Buffer(body)))
}

/// How a streamed delivery ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The peer closed the connection and every byte reached the pipe.
    Completed { bytes: u64 },
    /// The consumer dropped its end first.
    ConsumerClosed { bytes: u64 },
    /// The transfer broke off; the consumer received this error.
    Failed(NetError),
}

#[derive(Debug)]
enum PumpError {
    PeerClosed,
    TimedOut(Duration),
}

/// Streamed mode. `deliver_response` fires before any body byte is pushed.
pub(crate) async fn deliver_streamed<S, D>(
    id: Uuid,
    stream: &mut S,
    read_buf: &mut BytesMut,
    head: ResponseHead,
    config: &TransportConfig,
    delegate: &mut D,
) -> StreamOutcome
where
    S: AsyncRead + Unpin,
    D: LoaderDelegate + ?Sized,
{
    let (producer, consumer) = body_pipe(config.stream_channel_capacity);
    delegate.deliver_response(head.into_response(ResponseBody::Stream(consumer)));

    let chunk_size = config.stream_chunk_size.max(1);
    let timeout = config.backpressure_timeout();
    let mut bytes = 0u64;

    loop {
        match pump(&producer, read_buf, chunk_size, timeout).await {
            Ok(n) => bytes += n as u64,
            Err(PumpError::PeerClosed) => {
                log::debug!("[{id}] body consumer closed after {bytes} bytes");
                return StreamOutcome::ConsumerClosed { bytes };
            }
            Err(PumpError::TimedOut(limit)) => {
                log::warn!("[{id}] body consumer blocked for more than {limit:?}");
                let error = NetError::BodyTransferFailed(format!("consumer blocked for more than {limit:?}"));
                producer.try_fail(error.clone());
                return StreamOutcome::Failed(error);
            }
        }

        read_buf.reserve(config.read_buffer_size);
        let read = tokio::select! {
            biased;
            _ = producer.closed() => {
                log::debug!("[{id}] body consumer closed after {bytes} bytes");
                return StreamOutcome::ConsumerClosed { bytes };
            }
            read = stream.read_buf(read_buf) => read,
        };
        match read {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if is_end_of_body(&e) => break,
            Err(e) => {
                log::debug!("[{id}] body read failed after {bytes} bytes: {e}");
                let error = NetError::BodyTransferFailed(e.to_string());
                fail_stream(id, producer, error.clone(), timeout).await;
                return StreamOutcome::Failed(error);
            }
        }
    }

    log::trace!("[{id}] streamed {bytes} body bytes");
    StreamOutcome::Completed { bytes }
}

/// End the stream with `error`, waiting no longer than `timeout` for the
/// consumer to make room for it.
async fn fail_stream(id: Uuid, producer: BodyProducer, error: NetError, timeout: Option<Duration>) {
    match timeout {
        None => producer.fail(error).await,
        Some(limit) => {
            if tokio::time::timeout(limit, producer.fail(error)).await.is_err() {
                log::warn!("[{id}] body consumer blocked for more than {limit:?}, error not delivered");
            }
        }
    }
}

/// Push everything currently buffered, `chunk_size` bytes at a time.
async fn pump(
    producer: &BodyProducer,
    read_buf: &mut BytesMut,
    chunk_size: usize,
    timeout: Option<Duration>,
) -> Result<usize, PumpError> {
    let mut sent = 0;
    while !read_buf.is_empty() {
        let len = chunk_size.min(read_buf.len());
        let chunk = read_buf.split_to(len).freeze();
        sent += write_chunk(producer, chunk, timeout).await?;
    }
    Ok(sent)
}

/// Write one chunk, retrying the identical chunk after every would-block.
async fn write_chunk(
    producer: &BodyProducer,
    mut chunk: Bytes,
    timeout: Option<Duration>,
) -> Result<usize, PumpError> {
    loop {
        match producer.try_write(chunk) {
            Ok(n) => return Ok(n),
            Err(TryWriteError::PeerClosed) => return Err(PumpError::PeerClosed),
            Err(TryWriteError::WouldBlock(rejected)) => {
                chunk = rejected;
                let readiness = match timeout {
                    None => producer.wait_writable().await,
                    Some(limit) => tokio::time::timeout(limit, producer.wait_writable())
                        .await
                        .map_err(|_| PumpError::TimedOut(limit))?,
                };
                if readiness == Readiness::PeerClosed {
                    return Err(PumpError::PeerClosed);
                }
            }
        }
    }
}
