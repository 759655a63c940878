//! Asynchronous HTTP/1.1 client with transparent TLS.
//!
//! # Overview
//! Each request gets a fresh connection driven by `HttpClient`, a state
//! machine that resolves, connects, optionally runs a TLS handshake, writes
//! the serialized request, parses the status line and headers, and then
//! either reports a redirect or delivers the body. Bodies are read until the
//! peer closes the connection (`Connection: close` is always sent).
//!
//! # Design
//! - One state machine, generic over `Transport`; plain and TLS sockets share
//!   every step after the connect.
//! - Bodies are delivered either buffered (one exact-size allocation) or
//!   streamed through a bounded pipe that applies backpressure to the socket.
//! - Certificate decisions go through a `TrustPolicy`. The strict policy is
//!   the default; bypassing verification needs the `insecure-skip-verify`
//!   feature or an explicit `tls::danger` policy.
//! - `UrlLoader` and `NetworkService` add URL parsing, redirect following and
//!   a cap on concurrent loads on top.

pub mod body;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod loader;
pub mod parser;
pub mod pipe;
pub mod request;
pub mod service;
pub mod tls;
pub mod transport;
pub mod upload;

pub use body::StreamOutcome;
pub use config::TransportConfig;
pub use connection::{Endpoint, HttpClient, LoaderDelegate};
pub use error::{ConfigError, ErrorKind, NetError};
pub use http::{BodyMode, HttpMethod, HttpResponse, ResponseBody};
pub use loader::{UrlLoader, UrlRequest};
pub use pipe::BodyStream;
pub use service::NetworkService;
pub use tls::{TlsTransport, TrustPolicy};
pub use transport::{PlainTransport, Transport};
pub use upload::{BytesUploadReader, IoUploadReader, UploadElementReader};
