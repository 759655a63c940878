//! Per-request connection state machine.
//!
//! # Overview
//! One `HttpClient` drives one request over one fresh connection:
//!
//! ```text
//! Resolving -> Connecting -> [Handshaking] -> WritingRequest
//!   -> ReadingStatusLine -> ReadingHeaders -> RedirectDetected | DeliveringBody
//!   -> Closed
//! ```
//!
//! Any state may move to `Failed`. `Handshaking` is only visited by secure
//! transports. Each state runs exactly one asynchronous step, so no two I/O
//! operations for the same connection are ever in flight together. The
//! socket lives inside the state value and is dropped, closing the
//! connection, as soon as the machine reaches `Closed` or `Failed`.
//!
//! # Outcomes
//! Every run tells the delegate exactly one of: a response, a redirect, or
//! an error. In streamed mode the response is delivered before the body has
//! been read; body problems after that point travel through the body stream.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::body::{self, StreamOutcome};
use crate::config::TransportConfig;
use crate::error::NetError;
use crate::http::{BodyMode, HttpResponse, ResponseHead};
use crate::parser::{self, StatusLine};
use crate::request::{build_request, SerializedRequest};
use crate::transport::{bare_host, Transport};
use crate::upload::UploadElementReader;

/// The owner of a request. Exactly one method is called per run.
pub trait LoaderDelegate: Send {
    fn deliver_response(&mut self, response: HttpResponse);

    /// A 301 or 302 was received. The connection is already closed and no
    /// body was read; following the redirect is up to the delegate.
    fn deliver_redirect(&mut self, location: String);

    fn deliver_error(&mut self, error: NetError);
}

/// Host and port a request is sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

enum State<S> {
    Resolving,
    Connecting(Vec<SocketAddr>),
    Handshaking(TcpStream),
    WritingRequest(S),
    ReadingStatusLine(S),
    ReadingHeaders(S),
    RedirectDetected(String),
    DeliveringBody(S, ResponseHead),
    Closed,
    Failed(NetError),
}

impl<S> State<S> {
    fn name(&self) -> &'static str {
        match self {
            State::Resolving => "Resolving",
            State::Connecting(_) => "Connecting",
            State::Handshaking(_) => "Handshaking",
            State::WritingRequest(_) => "WritingRequest",
            State::ReadingStatusLine(_) => "ReadingStatusLine",
            State::ReadingHeaders(_) => "ReadingHeaders",
            State::RedirectDetected(_) => "RedirectDetected",
            State::DeliveringBody(..) => "DeliveringBody",
            State::Closed => "Closed",
            State::Failed(_) => "Failed",
        }
    }
}

/// Connection context for a single request, generic over the socket flavor.
pub struct HttpClient<T: Transport> {
    id: Uuid,
    transport: T,
    endpoint: Endpoint,
    config: Arc<TransportConfig>,
    request: Option<SerializedRequest>,
    read_buf: BytesMut,
    status: Option<StatusLine>,
    redirect_location: Option<String>,
}

impl<T: Transport> HttpClient<T> {
    pub fn new(transport: T, endpoint: Endpoint, config: Arc<TransportConfig>) -> Self {
        Self {
            id: Uuid::new_v4(),
            transport,
            endpoint,
            config,
            request: None,
            read_buf: BytesMut::new(),
            status: None,
            redirect_location: None,
        }
    }

    /// Id used to tag this request's log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Serialize the request. Fails before any I/O on a disallowed method or
    /// a failing upload reader.
    pub fn create_request(
        &mut self,
        path: &str,
        method: &str,
        extra_headers: &[(String, String)],
        readers: &mut [Box<dyn UploadElementReader>],
    ) -> Result<(), NetError> {
        let request = build_request(method, path, &self.endpoint.host, extra_headers, readers)?;
        log::trace!(
            "[{}] {method} {path}: {} header bytes, {} body bytes",
            self.id,
            request.header().len(),
            request.body().len()
        );
        self.request = Some(request);
        Ok(())
    }

    /// Status code of the last parsed status line.
    pub fn status_code(&self) -> Option<u32> {
        self.status.as_ref().map(|s| s.code)
    }

    /// Target of the last redirect seen by this client.
    pub fn redirect_location(&self) -> Option<&str> {
        self.redirect_location.as_deref()
    }

    /// Run the request to completion. `url` is recorded on the response.
    pub async fn start<D>(&mut self, url: &str, mode: BodyMode, delegate: &mut D)
    where
        D: LoaderDelegate + ?Sized,
    {
        let Some(mut request) = self.request.take() else {
            delegate.deliver_error(NetError::InvalidArgument(
                "start called without a serialized request".to_string(),
            ));
            return;
        };

        let mut state: State<T::Stream> = State::Resolving;
        loop {
            log::trace!("[{}] {}", self.id, state.name());
            state = match state {
                State::Resolving => match self.resolve().await {
                    Ok(addrs) => State::Connecting(addrs),
                    Err(e) => State::Failed(e),
                },
                State::Connecting(addrs) => match self.connect(&addrs).await {
                    Ok(tcp) if T::SECURE => State::Handshaking(tcp),
                    Ok(tcp) => match self.transport.establish(tcp, &self.endpoint.host).await {
                        Ok(stream) => State::WritingRequest(stream),
                        Err(e) => State::Failed(e),
                    },
                    Err(e) => State::Failed(e),
                },
                State::Handshaking(tcp) => match self.transport.establish(tcp, &self.endpoint.host).await {
                    Ok(stream) => State::WritingRequest(stream),
                    Err(e) => State::Failed(e),
                },
                State::WritingRequest(mut stream) => match write_request(&mut stream, &mut request).await {
                    Ok(()) => State::ReadingStatusLine(stream),
                    Err(e) => State::Failed(e),
                },
                State::ReadingStatusLine(mut stream) => match self.read_status_line(&mut stream).await {
                    Ok(()) => State::ReadingHeaders(stream),
                    Err(e) => State::Failed(e),
                },
                State::ReadingHeaders(mut stream) => match self.read_headers(&mut stream, url).await {
                    Ok(head) => self.branch(stream, head),
                    Err(e) => State::Failed(e),
                },
                State::RedirectDetected(location) => {
                    log::debug!("[{}] redirecting to {location}", self.id);
                    self.redirect_location = Some(location.clone());
                    delegate.deliver_redirect(location);
                    State::Closed
                }
                State::DeliveringBody(mut stream, head) => match mode {
                    BodyMode::Buffered => {
                        match body::deliver_buffered(&mut stream, &mut self.read_buf, head, &self.config).await {
                            Ok(response) => {
                                delegate.deliver_response(response);
                                State::Closed
                            }
                            Err(e) => State::Failed(e),
                        }
                    }
                    BodyMode::Streamed => {
                        let outcome = body::deliver_streamed(
                            self.id,
                            &mut stream,
                            &mut self.read_buf,
                            head,
                            &self.config,
                            delegate,
                        )
                        .await;
                        if let StreamOutcome::Failed(e) = &outcome {
                            log::debug!("[{}] streamed body ended with {}", self.id, e.kind());
                        }
                        State::Closed
                    }
                },
                State::Closed => {
                    self.read_buf.clear();
                    return;
                }
                State::Failed(e) => {
                    log::debug!("[{}] request failed: {e} ({})", self.id, e.kind());
                    self.read_buf.clear();
                    delegate.deliver_error(e);
                    return;
                }
            };
        }
    }

    async fn resolve(&self) -> Result<Vec<SocketAddr>, NetError> {
        let host = bare_host(&self.endpoint.host);
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, self.endpoint.port))
            .await
            .map_err(|e| NetError::NameNotResolved(format!("{host}: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(NetError::NameNotResolved(format!("{host}: no addresses")));
        }
        Ok(addrs)
    }

    async fn connect(&self, addrs: &[SocketAddr]) -> Result<TcpStream, NetError> {
        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(tcp) => return Ok(tcp),
                Err(e) => {
                    log::trace!("[{}] connect to {addr} failed: {e}", self.id);
                    last_error = Some(e);
                }
            }
        }
        Err(NetError::ConnectionFailed(
            last_error.map(|e| e.to_string()).unwrap_or_else(|| "no endpoints".to_string()),
        ))
    }

    async fn read_status_line<S>(&mut self, stream: &mut S) -> Result<(), NetError>
    where
        S: AsyncRead + Unpin,
    {
        let end = self.read_until(stream, parser::find_line_end, "status line").await?;
        let line = self.read_buf.split_to(end + 2);
        let status = parser::parse_status_line(&line[..end])?;
        log::trace!("[{}] status {} {}", self.id, status.code, status.message);
        self.status = Some(status);
        Ok(())
    }

    async fn read_headers<S>(&mut self, stream: &mut S, url: &str) -> Result<ResponseHead, NetError>
    where
        S: AsyncRead + Unpin,
    {
        let end = self.read_until(stream, parser::find_head_end, "end of headers").await?;
        let block = self.read_buf.split_to(end);
        let headers = parser::parse_header_block(&block);
        let status = self
            .status
            .clone()
            .ok_or_else(|| NetError::InvalidResponse("headers before status line".to_string()))?;
        Ok(ResponseHead {
            url: url.to_string(),
            http_version: status.version,
            status_code: status.code,
            status_message: status.message,
            headers,
        })
    }

    fn branch(&self, stream: T::Stream, head: ResponseHead) -> State<T::Stream> {
        if !matches!(head.status_code, 301 | 302) {
            return State::DeliveringBody(stream, head);
        }
        drop(stream);
        match parser::last_header(&head.headers, "Location") {
            Some(location) => State::RedirectDetected(location.to_string()),
            None => State::Failed(NetError::InvalidResponse(format!(
                "{} without a Location header",
                head.status_code
            ))),
        }
    }

    /// Read until `find` locates a terminator in the read buffer; returns its
    /// index.
    async fn read_until<S, F>(&mut self, stream: &mut S, find: F, what: &str) -> Result<usize, NetError>
    where
        S: AsyncRead + Unpin,
        F: Fn(&[u8]) -> Option<usize>,
    {
        loop {
            if let Some(end) = find(&self.read_buf[..]) {
                return Ok(end);
            }
            if self.read_buf.len() > self.config.max_head_bytes {
                return Err(NetError::InvalidResponse(format!(
                    "no {what} within {} bytes",
                    self.config.max_head_bytes
                )));
            }
            self.read_buf.reserve(self.config.read_buffer_size);
            match stream.read_buf(&mut self.read_buf).await {
                Ok(0) => {
                    return Err(NetError::InvalidResponse(format!("connection closed before {what}")));
                }
                Ok(_) => {}
                Err(e) if body::is_end_of_body(&e) => {
                    return Err(NetError::InvalidResponse(format!("connection closed before {what}")));
                }
                Err(e) => return Err(NetError::TransportFailed(e.to_string())),
            }
        }
    }
}

/// Write the outstanding request bytes, re-offering whatever a partial write
/// left behind.
async fn write_request<S>(stream: &mut S, request: &mut SerializedRequest) -> Result<(), NetError>
where
    S: AsyncWrite + Unpin,
{
    while !request.is_empty() {
        let written = stream
            .write_vectored(&request.io_slices())
            .await
            .map_err(|e| NetError::RequestWriteFailed(e.to_string()))?;
        if written == 0 {
            return Err(NetError::RequestWriteFailed("socket accepted no bytes".to_string()));
        }
        request.consume(written);
    }
    stream
        .flush()
        .await
        .map_err(|e| NetError::RequestWriteFailed(e.to_string()))
}
