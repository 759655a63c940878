//! Socket flavors.
//!
//! # Design
//! The connection state machine is written once and is generic over a
//! `Transport`. Resolution and the TCP connect are shared; a transport only
//! decides how a connected `TcpStream` becomes the byte stream the protocol
//! runs over. `PlainTransport` hands the socket back untouched,
//! `TlsTransport` (in `tls`) runs a handshake through the trust gate.

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::NetError;

pub trait Transport: Clone + Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Whether `establish` performs a handshake. Only secure transports pass
    /// through the `Handshaking` state.
    const SECURE: bool;

    /// Turn a connected socket into the stream requests are written to.
    fn establish(
        &self,
        tcp: TcpStream,
        host: &str,
    ) -> impl Future<Output = Result<Self::Stream, NetError>> + Send;
}

/// `host` without the brackets URLs put around IPv6 literals.
pub fn bare_host(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

/// Plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTransport;

impl Transport for PlainTransport {
    type Stream = TcpStream;

    const SECURE: bool = false;

    async fn establish(&self, tcp: TcpStream, _host: &str) -> Result<TcpStream, NetError> {
        Ok(tcp)
    }
}
