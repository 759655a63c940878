//! Request serialization.
//!
//! # Design
//! The request is rendered once into two buffers, header block and body, so
//! partial socket writes can be accounted for by advancing offsets instead of
//! re-rendering. Nothing here performs network I/O; the only side effects are
//! the upload readers being drained.

use std::io::IoSlice;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::NetError;
use crate::http::HttpMethod;
use crate::upload::{drain_readers, UploadElementReader};

/// Header and body bytes still waiting to be written to the socket.
#[derive(Debug, Clone, Default)]
pub struct SerializedRequest {
    header: BytesMut,
    body: BytesMut,
    content_length: Option<u64>,
}

impl SerializedRequest {
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// `Some(len)` only when the request carries a non-empty body.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn remaining(&self) -> usize {
        self.header.len() + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The non-empty buffers still to be sent, header first.
    pub fn io_slices(&self) -> Vec<IoSlice<'_>> {
        [&self.header[..], &self.body[..]]
            .into_iter()
            .filter(|b| !b.is_empty())
            .map(IoSlice::new)
            .collect()
    }

    /// Record that `n` bytes were accepted by the socket. Header bytes are
    /// consumed before body bytes.
    pub fn consume(&mut self, n: usize) {
        let from_header = n.min(self.header.len());
        self.header.advance(from_header);
        let from_body = (n - from_header).min(self.body.len());
        self.body.advance(from_body);
    }
}

/// Serialize a request.
///
/// Header order is fixed: request line, `Host`, `Connection: close`, the
/// caller's headers verbatim and in order, a synthesized `Accept: */*` when the
/// caller supplied none, then `Content-Length` when the body is non-empty.
pub fn build_request(
    method: &str,
    path: &str,
    host: &str,
    extra_headers: &[(String, String)],
    readers: &mut [Box<dyn UploadElementReader>],
) -> Result<SerializedRequest, NetError> {
    let method: HttpMethod = method.parse().inspect_err(|_| {
        log::debug!("method {method} is not allowed");
    })?;

    let mut header = BytesMut::with_capacity(256);
    put_line(&mut header, &format!("{method} {path} HTTP/1.1"));
    put_line(&mut header, &format!("Host: {host}"));
    put_line(&mut header, "Connection: close");

    let mut has_accept = false;
    for (name, value) in extra_headers {
        put_line(&mut header, &format!("{name}: {value}"));
        has_accept |= name.eq_ignore_ascii_case("accept");
    }
    if !has_accept {
        put_line(&mut header, "Accept: */*");
    }

    let body = drain_readers(readers)?;

    let content_length = (!body.is_empty()).then_some(body.len() as u64);
    if let Some(len) = content_length {
        put_line(&mut header, &format!("Content-Length: {len}"));
    }
    header.put_slice(b"\r\n");

    Ok(SerializedRequest {
        header,
        body: BytesMut::from(&body[..]),
        content_length,
    })
}

fn put_line(buf: &mut BytesMut, line: &str) {
    buf.put_slice(line.as_bytes());
    buf.put_slice(b"\r\n");
}
