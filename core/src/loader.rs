//! URL-level loading on top of `HttpClient`.
//!
//! A `UrlLoader` turns a URL into an endpoint and a transport, runs one
//! `HttpClient` per hop on its own task, and follows redirects by starting a
//! fresh connection for each `Location`. The method, headers and body are
//! replayed unchanged on every hop.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use url::Url;

use crate::config::TransportConfig;
use crate::connection::{Endpoint, HttpClient, LoaderDelegate};
use crate::error::NetError;
use crate::http::{BodyMode, HttpMethod, HttpResponse};
use crate::tls::TlsTransport;
use crate::transport::{PlainTransport, Transport};
use crate::upload::{drain_readers, BytesUploadReader, UploadElementReader};

/// Everything needed to issue a load.
pub struct UrlRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<Box<dyn UploadElementReader>>,
    pub response_body_mode: BodyMode,
}

impl UrlRequest {
    /// A bodiless `GET` with a streamed response.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: Vec::new(),
            body: Vec::new(),
            response_body_mode: BodyMode::default(),
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, reader: impl UploadElementReader + 'static) -> Self {
        self.body.push(Box::new(reader));
        self
    }

    pub fn mode(mut self, mode: BodyMode) -> Self {
        self.response_body_mode = mode;
        self
    }
}

#[derive(Debug)]
enum HopOutcome {
    Response(HttpResponse),
    Redirect(String),
    Error(NetError),
}

/// Forwards the single outcome of a hop over a oneshot channel.
struct ChannelDelegate {
    tx: Option<oneshot::Sender<HopOutcome>>,
}

impl ChannelDelegate {
    fn send(&mut self, outcome: HopOutcome) {
        match self.tx.take() {
            Some(tx) => {
                if tx.send(outcome).is_err() {
                    log::debug!("loader went away before the outcome arrived");
                }
            }
            None => log::warn!("second outcome for one request dropped"),
        }
    }
}

impl LoaderDelegate for ChannelDelegate {
    fn deliver_response(&mut self, response: HttpResponse) {
        self.send(HopOutcome::Response(response));
    }

    fn deliver_redirect(&mut self, location: String) {
        self.send(HopOutcome::Redirect(location));
    }

    fn deliver_error(&mut self, error: NetError) {
        self.send(HopOutcome::Error(error));
    }
}

/// Per-hop inputs that do not depend on the transport flavor.
struct Hop {
    url: Url,
    endpoint: Endpoint,
    target: String,
}

impl Hop {
    fn parse(url: Url) -> Result<Self, NetError> {
        let host = url
            .host_str()
            .ok_or_else(|| NetError::InvalidArgument(format!("{url} has no host")))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| NetError::InvalidArgument(format!("{url} has no port")))?;
        let mut target = url.path().to_string();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }
        Ok(Self {
            endpoint: Endpoint::new(host, port),
            target,
            url,
        })
    }
}

/// Issues a request and follows its redirects.
#[derive(Debug, Clone)]
pub struct UrlLoader {
    config: Arc<TransportConfig>,
    tls: TlsTransport,
    slots: Arc<Semaphore>,
}

impl UrlLoader {
    pub fn new(config: Arc<TransportConfig>, tls: TlsTransport, slots: Arc<Semaphore>) -> Self {
        Self { config, tls, slots }
    }

    /// Run `request` to its final response.
    ///
    /// In streamed mode the response arrives as soon as its headers are
    /// parsed; the body follows through `ResponseBody::Stream`.
    pub async fn start(&self, mut request: UrlRequest) -> Result<HttpResponse, NetError> {
        let mut url = Url::parse(&request.url)
            .map_err(|e| NetError::InvalidArgument(format!("{}: {e}", request.url)))?;
        if !HttpMethod::is_allowed(&request.method) {
            return Err(NetError::InvalidMethod(request.method));
        }
        let body = Bytes::from(drain_readers(&mut request.body)?);

        let mut redirects = 0;
        loop {
            let hop = Hop::parse(url)?;
            let (method, headers, mode) = (&request.method, &request.headers, request.response_body_mode);
            let outcome = match hop.url.scheme() {
                "http" => self.run_hop(PlainTransport, &hop, method, headers, &body, mode).await?,
                "https" => self.run_hop(self.tls.clone(), &hop, method, headers, &body, mode).await?,
                other => {
                    return Err(NetError::InvalidArgument(format!("unsupported scheme {other:?}")));
                }
            };
            match outcome {
                HopOutcome::Response(response) => return Ok(response),
                HopOutcome::Error(e) => return Err(e),
                HopOutcome::Redirect(location) => {
                    redirects += 1;
                    if redirects > self.config.max_redirects {
                        return Err(NetError::TooManyRedirects(self.config.max_redirects));
                    }
                    url = hop.url.join(&location).map_err(|e| {
                        NetError::InvalidResponse(format!("bad redirect target {location:?}: {e}"))
                    })?;
                    log::debug!("following redirect {redirects} to {url}");
                }
            }
        }
    }

    async fn run_hop<T: Transport>(
        &self,
        transport: T,
        hop: &Hop,
        method: &str,
        headers: &[(String, String)],
        body: &Bytes,
        mode: BodyMode,
    ) -> Result<HopOutcome, NetError> {
        let permit = self.acquire().await?;
        let mut client = HttpClient::new(transport, hop.endpoint.clone(), self.config.clone());
        let mut readers: Vec<Box<dyn UploadElementReader>> = Vec::new();
        if !body.is_empty() {
            readers.push(Box::new(BytesUploadReader::new(body.clone())));
        }
        client.create_request(&hop.target, method, headers, &mut readers)?;
        log::debug!("[{}] {method} {}", client.id(), hop.url);

        let (tx, rx) = oneshot::channel();
        let url = hop.url.to_string();
        tokio::spawn(async move {
            let _permit: OwnedSemaphorePermit = permit;
            let mut delegate = ChannelDelegate { tx: Some(tx) };
            client.start(&url, mode, &mut delegate).await;
        });

        rx.await
            .map_err(|_| NetError::TransportFailed("request task ended without an outcome".to_string()))
    }

    async fn acquire(&self) -> Result<OwnedSemaphorePermit, NetError> {
        self.slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| NetError::TransportFailed("network service shut down".to_string()))
    }
}
