//! HTTP data types shared by the builder, the connection state machine and
//! the body delivery engine.
//!
//! # Design
//! The method allow-list is a `const` table: it is built at compile time,
//! shared read-only by every connection and never mutated. Response headers
//! are kept as an ordered `Vec` of pairs so duplicates survive exactly as they
//! arrived on the wire.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::NetError;
use crate::pipe::BodyStream;

/// HTTP method accepted by the request builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Trace,
    Connect,
    Patch,
}

/// The allow-list. Matching is exact and case-sensitive.
pub const ALLOWED_METHODS: [(&str, HttpMethod); 8] = [
    ("GET", HttpMethod::Get),
    ("HEAD", HttpMethod::Head),
    ("POST", HttpMethod::Post),
    ("PUT", HttpMethod::Put),
    ("DELETE", HttpMethod::Delete),
    ("TRACE", HttpMethod::Trace),
    ("CONNECT", HttpMethod::Connect),
    ("PATCH", HttpMethod::Patch),
];

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Patch => "PATCH",
        }
    }

    pub fn is_allowed(method: &str) -> bool {
        ALLOWED_METHODS.iter().any(|(name, _)| *name == method)
    }
}

impl FromStr for HttpMethod {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALLOWED_METHODS
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, method)| *method)
            .ok_or_else(|| NetError::InvalidMethod(s.to_string()))
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the response body is handed to the collaborator. Decided before the
/// request starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyMode {
    /// Read until the peer closes, then deliver one contiguous buffer.
    Buffered,
    /// Deliver headers immediately and push the body through a `BodyStream`.
    #[default]
    Streamed,
}

/// Where the response body lives.
#[derive(Debug)]
pub enum ResponseBody {
    /// Fully materialized body (buffered mode).
    Buffer(Bytes),
    /// Consumer end of the body pipe (streamed mode).
    Stream(BodyStream),
}

impl ResponseBody {
    pub fn as_buffer(&self) -> Option<&Bytes> {
        match self {
            ResponseBody::Buffer(bytes) => Some(bytes),
            ResponseBody::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<BodyStream> {
        match self {
            ResponseBody::Buffer(_) => None,
            ResponseBody::Stream(stream) => Some(stream),
        }
    }
}

/// Status line and headers of a response whose body has not been handled yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub url: String,
    pub http_version: String,
    pub status_code: u32,
    pub status_message: String,
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    pub fn into_response(self, body: ResponseBody) -> HttpResponse {
        HttpResponse {
            url: self.url,
            http_version: self.http_version,
            status_code: self.status_code,
            status_message: self.status_message,
            headers: self.headers,
            body,
        }
    }
}

/// The response envelope delivered to the collaborator.
///
/// Any status code is a successful transport outcome; interpreting 4xx/5xx is
/// left to the caller.
#[derive(Debug)]
pub struct HttpResponse {
    pub url: String,
    pub http_version: String,
    pub status_code: u32,
    pub status_message: String,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl HttpResponse {
    /// `"HTTP/1.1 200 OK"`, or without the message when the server sent none.
    pub fn status_line(&self) -> String {
        if self.status_message.is_empty() {
            format!("{} {}", self.http_version, self.status_code)
        } else {
            format!("{} {} {}", self.http_version, self.status_code, self.status_message)
        }
    }

    /// First header value whose name matches `name` ASCII case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
