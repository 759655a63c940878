//! End-to-end tests against the mock server crate.
//!
//! # Design
//! Exact wire behavior (request bytes, malformed responses, redirects without
//! a target) is checked against `mock_server::canned`, which serves raw bytes.
//! Everything else runs against the axum fixture router on a random port,
//! with `ureq` as an independent client to cross-check body bytes.

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mock_server::canned::Canned;
use mock_server::{pattern, Echo};
use netloader_core::{
    BodyMode, BytesUploadReader, Endpoint, HttpClient, HttpResponse, IoUploadReader, LoaderDelegate,
    NetError, NetworkService, PlainTransport, TlsTransport, TransportConfig, UploadElementReader,
    UrlRequest,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
struct Recorder {
    responses: Vec<HttpResponse>,
    redirects: Vec<String>,
    errors: Vec<NetError>,
}

impl LoaderDelegate for Recorder {
    fn deliver_response(&mut self, response: HttpResponse) {
        self.responses.push(response);
    }
    fn deliver_redirect(&mut self, location: String) {
        self.redirects.push(location);
    }
    fn deliver_error(&mut self, error: NetError) {
        self.errors.push(error);
    }
}

impl Recorder {
    fn outcomes(&self) -> usize {
        self.responses.len() + self.redirects.len() + self.errors.len()
    }
}

async fn spawn_fixture_server() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(mock_server::run(listener));
    addr
}

fn plain_client(addr: SocketAddr) -> HttpClient<PlainTransport> {
    HttpClient::new(
        PlainTransport,
        Endpoint::new(addr.ip().to_string(), addr.port()),
        Arc::new(TransportConfig::default()),
    )
}

/// Run a plain GET for `path` against a canned responder.
async fn run_canned(canned: Canned, path: &str, mode: BodyMode) -> (Recorder, Vec<u8>) {
    init_logging();
    let (addr, server) = canned.serve_once().await.unwrap();
    let mut client = plain_client(addr);
    client.create_request(path, "GET", &[], &mut []).unwrap();

    let mut recorder = Recorder::default();
    client
        .start(&format!("http://{addr}{path}"), mode, &mut recorder)
        .await;
    let captured = server.await.unwrap().unwrap();
    assert_eq!(recorder.outcomes(), 1, "exactly one outcome per request");
    (recorder, captured)
}

fn service() -> NetworkService {
    NetworkService::new(TransportConfig::default()).unwrap()
}

// ---------------------------------------------------------------------------
// Wire-level behavior
// ---------------------------------------------------------------------------

#[tokio::test]
async fn buffered_response_with_early_body_bytes() {
    let canned = Canned::new("HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
    let (recorder, captured) = run_canned(canned, "/index", BodyMode::Buffered).await;

    assert_eq!(
        String::from_utf8(captured).unwrap(),
        "GET /index HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\nAccept: */*\r\n\r\n"
    );

    let response = &recorder.responses[0];
    assert_eq!(response.status_line(), "HTTP/1.1 200 OK");
    assert_eq!(response.status_code, 200);
    assert_eq!(response.status_message, "OK");
    assert_eq!(response.headers, vec![("Content-Length".to_string(), "5".to_string())]);
    assert_eq!(response.body.as_buffer().unwrap().as_ref(), b"hello");
}

#[tokio::test]
async fn body_is_read_until_close_not_content_length() {
    let canned = Canned::new("HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nabc")
        .then("def")
        .pause(Duration::from_millis(20));
    let (recorder, _) = run_canned(canned, "/", BodyMode::Buffered).await;
    assert_eq!(recorder.responses[0].body.as_buffer().unwrap().as_ref(), b"abcdef");
}

#[tokio::test]
async fn head_split_across_segments() {
    let canned = Canned::new("HTTP/1.1 20")
        .then("4 No Content\r\nX-A: 1\r")
        .then("\nX-A: 2\r\n\r\n")
        .pause(Duration::from_millis(10));
    let (recorder, _) = run_canned(canned, "/", BodyMode::Buffered).await;

    let response = &recorder.responses[0];
    assert_eq!(response.status_code, 204);
    assert_eq!(response.status_message, "No Content");
    assert_eq!(
        response.headers,
        vec![("X-A".to_string(), "1".to_string()), ("X-A".to_string(), "2".to_string())]
    );
    assert!(response.body.as_buffer().unwrap().is_empty());
}

#[tokio::test]
async fn redirect_is_reported_without_body() {
    let canned = Canned::new(
        "HTTP/1.1 302 Found\r\nLocation: http://example.com/new\r\n\r\nignored body",
    );
    let (recorder, _) = run_canned(canned, "/old", BodyMode::Streamed).await;
    assert_eq!(recorder.redirects, vec!["http://example.com/new".to_string()]);
    assert!(recorder.responses.is_empty());
}

#[tokio::test]
async fn redirect_uses_last_location() {
    let canned = Canned::new("HTTP/1.1 301 Moved\r\nLocation: /a\r\nlocation: /b\r\n\r\n");
    let (recorder, _) = run_canned(canned, "/", BodyMode::Buffered).await;
    assert_eq!(recorder.redirects, vec!["/b".to_string()]);
}

#[tokio::test]
async fn client_records_status_and_redirect_target() {
    init_logging();
    let (addr, server) = Canned::new("HTTP/1.1 302 Found\r\nLocation: /next\r\n\r\n")
        .serve_once()
        .await
        .unwrap();
    let mut client = plain_client(addr);
    assert_eq!(client.status_code(), None);
    assert_eq!(client.redirect_location(), None);

    client.create_request("/", "GET", &[], &mut []).unwrap();
    let mut recorder = Recorder::default();
    client
        .start(&format!("http://{addr}/"), BodyMode::Buffered, &mut recorder)
        .await;
    server.await.unwrap().unwrap();

    assert_eq!(client.status_code(), Some(302));
    assert_eq!(client.redirect_location(), Some("/next"));
    assert_eq!(recorder.redirects, vec!["/next".to_string()]);
}

#[tokio::test]
async fn client_records_status_of_plain_response() {
    let (addr, server) = Canned::new("HTTP/1.1 404 Not Found\r\n\r\n").serve_once().await.unwrap();
    let mut client = plain_client(addr);
    client.create_request("/", "GET", &[], &mut []).unwrap();
    let mut recorder = Recorder::default();
    client
        .start(&format!("http://{addr}/"), BodyMode::Buffered, &mut recorder)
        .await;
    server.await.unwrap().unwrap();

    assert_eq!(client.status_code(), Some(404));
    assert_eq!(client.redirect_location(), None);
}

#[tokio::test]
async fn redirect_without_location_is_invalid() {
    let canned = Canned::new("HTTP/1.1 302 Found\r\nServer: x\r\n\r\n");
    let (recorder, _) = run_canned(canned, "/", BodyMode::Buffered).await;
    assert!(matches!(recorder.errors.as_slice(), [NetError::InvalidResponse(_)]));
}

#[tokio::test]
async fn malformed_status_line_is_invalid() {
    let (recorder, _) = run_canned(Canned::new("garbage\r\n\r\n"), "/", BodyMode::Buffered).await;
    assert!(matches!(recorder.errors.as_slice(), [NetError::InvalidResponse(_)]));
}

#[tokio::test]
async fn close_before_status_line_is_invalid() {
    let (recorder, _) = run_canned(Canned::silent(), "/", BodyMode::Streamed).await;
    assert!(matches!(recorder.errors.as_slice(), [NetError::InvalidResponse(_)]));
}

#[tokio::test]
async fn close_inside_headers_is_invalid() {
    let canned = Canned::new("HTTP/1.1 200 OK\r\nX-Partial: ye");
    let (recorder, _) = run_canned(canned, "/", BodyMode::Buffered).await;
    assert!(matches!(recorder.errors.as_slice(), [NetError::InvalidResponse(_)]));
}

#[tokio::test]
async fn streamed_response_arrives_before_body() {
    init_logging();
    let canned = Canned::new("HTTP/1.1 200 OK\r\n\r\nfirst-")
        .then("second")
        .pause(Duration::from_millis(20));
    let (addr, server) = canned.serve_once().await.unwrap();

    let mut client = plain_client(addr);
    client.create_request("/", "GET", &[], &mut []).unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel();

    struct Forward(Option<tokio::sync::oneshot::Sender<HttpResponse>>);
    impl LoaderDelegate for Forward {
        fn deliver_response(&mut self, response: HttpResponse) {
            let _ = self.0.take().unwrap().send(response);
        }
        fn deliver_redirect(&mut self, location: String) {
            panic!("unexpected redirect to {location}");
        }
        fn deliver_error(&mut self, error: NetError) {
            panic!("unexpected error {error}");
        }
    }

    let task = tokio::spawn(async move {
        let mut delegate = Forward(Some(tx));
        client.start("http://canned/", BodyMode::Streamed, &mut delegate).await;
    });

    let response = rx.await.unwrap();
    assert_eq!(response.status_code, 200);
    let body = response.body.into_stream().unwrap().read_to_end().await.unwrap();
    assert_eq!(body, b"first-second");
    task.await.unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn post_body_follows_header() {
    init_logging();
    let (addr, server) = Canned::new("HTTP/1.1 201 Created\r\n\r\n").serve_once().await.unwrap();
    let mut client = plain_client(addr);
    let mut readers: Vec<Box<dyn UploadElementReader>> = vec![
        Box::new(BytesUploadReader::new("abc")),
        Box::new(IoUploadReader::new(Cursor::new(b"defg".to_vec()))),
    ];
    let headers = vec![("Accept".to_string(), "text/plain".to_string())];
    client.create_request("/submit", "POST", &headers, &mut readers).unwrap();

    let mut recorder = Recorder::default();
    client.start("http://canned/submit", BodyMode::Buffered, &mut recorder).await;
    assert_eq!(recorder.responses[0].status_code, 201);

    let captured = String::from_utf8(server.await.unwrap().unwrap()).unwrap();
    assert_eq!(
        captured,
        "POST /submit HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\
         Accept: text/plain\r\nContent-Length: 7\r\n\r\nabcdefg"
    );
}

#[tokio::test]
async fn tls_against_plain_server_fails_handshake() {
    init_logging();
    let addr = spawn_fixture_server().await;
    let mut client = HttpClient::new(
        TlsTransport::new().unwrap(),
        Endpoint::new("localhost", addr.port()),
        Arc::new(TransportConfig::default()),
    );
    client.create_request("/hello", "GET", &[], &mut []).unwrap();

    let mut recorder = Recorder::default();
    client
        .start(&format!("https://localhost:{}/hello", addr.port()), BodyMode::Buffered, &mut recorder)
        .await;
    assert!(matches!(recorder.errors.as_slice(), [NetError::SslHandshakeIncomplete(_)]));
    assert_eq!(recorder.outcomes(), 1);
}

// ---------------------------------------------------------------------------
// Loader and service against the fixture router
// ---------------------------------------------------------------------------

#[tokio::test]
async fn loader_buffered_get() {
    init_logging();
    let addr = spawn_fixture_server().await;
    let response = service()
        .create_url_loader()
        .start(UrlRequest::get(format!("http://{addr}/hello")).mode(BodyMode::Buffered))
        .await
        .unwrap();

    assert_eq!(response.status_code, 200);
    assert_eq!(response.http_version, "HTTP/1.1");
    assert_eq!(response.body.as_buffer().unwrap().as_ref(), b"hello");
}

#[tokio::test]
async fn loader_streamed_body_matches_independent_client() {
    init_logging();
    let addr = spawn_fixture_server().await;
    let url = format!("http://{addr}/bytes/300000");

    let config = TransportConfig {
        stream_chunk_size: 4096,
        stream_channel_capacity: 2,
        ..TransportConfig::default()
    };
    let response = NetworkService::new(config)
        .unwrap()
        .create_url_loader()
        .start(UrlRequest::get(url.clone()))
        .await
        .unwrap();
    let streamed = response.body.into_stream().unwrap().read_to_end().await.unwrap();
    assert_eq!(streamed, pattern(300000));

    let via_ureq = tokio::task::spawn_blocking(move || {
        let mut response = ureq::get(&url).call().unwrap();
        response.body_mut().read_to_vec().unwrap()
    })
    .await
    .unwrap();
    assert_eq!(streamed, via_ureq);
}

#[tokio::test]
async fn loader_follows_redirects() {
    init_logging();
    let addr = spawn_fixture_server().await;
    let response = service()
        .create_url_loader()
        .start(UrlRequest::get(format!("http://{addr}/redirect/3")).mode(BodyMode::Buffered))
        .await
        .unwrap();

    assert_eq!(response.status_code, 200);
    assert_eq!(response.url, format!("http://{addr}/redirect/0"));
    assert_eq!(response.body.as_buffer().unwrap().as_ref(), b"redirected");
}

#[tokio::test]
async fn loader_follows_permanent_redirect() {
    let addr = spawn_fixture_server().await;
    let response = service()
        .create_url_loader()
        .start(UrlRequest::get(format!("http://{addr}/moved")).mode(BodyMode::Buffered))
        .await
        .unwrap();
    assert_eq!(response.url, format!("http://{addr}/hello"));
    assert_eq!(response.body.as_buffer().unwrap().as_ref(), b"hello");
}

#[tokio::test]
async fn loader_gives_up_after_redirect_budget() {
    let addr = spawn_fixture_server().await;
    let config = TransportConfig {
        max_redirects: 2,
        ..TransportConfig::default()
    };
    let err = NetworkService::new(config)
        .unwrap()
        .create_url_loader()
        .start(UrlRequest::get(format!("http://{addr}/redirect/5")))
        .await
        .unwrap_err();
    assert_eq!(err, NetError::TooManyRedirects(2));
}

#[tokio::test]
async fn loader_sends_method_headers_and_body() {
    init_logging();
    let addr = spawn_fixture_server().await;
    let request = UrlRequest::get(format!("http://{addr}/echo?q=1"))
        .method("PUT")
        .header("X-Test", "yes")
        .body(BytesUploadReader::new("hello "))
        .body(IoUploadReader::new(Cursor::new(b"world".to_vec())))
        .mode(BodyMode::Buffered);
    let response = service().create_url_loader().start(request).await.unwrap();
    assert_eq!(response.status_code, 200);

    let echo: Echo = serde_json::from_slice(response.body.as_buffer().unwrap()).unwrap();
    assert_eq!(echo.method, "PUT");
    assert_eq!(echo.uri, "/echo?q=1");
    assert_eq!(echo.body, "hello world");
    let header = |name: &str| {
        echo.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    };
    assert_eq!(header("x-test").as_deref(), Some("yes"));
    assert_eq!(header("connection").as_deref(), Some("close"));
    assert_eq!(header("accept").as_deref(), Some("*/*"));
    assert_eq!(header("content-length").as_deref(), Some("11"));
}

#[tokio::test]
async fn loader_reports_error_statuses_as_responses() {
    let addr = spawn_fixture_server().await;
    let response = service()
        .create_url_loader()
        .start(UrlRequest::get(format!("http://{addr}/status/503")).mode(BodyMode::Buffered))
        .await
        .unwrap();
    assert_eq!(response.status_code, 503);
    assert_eq!(response.status_message, "Service Unavailable");
    assert_eq!(response.body.as_buffer().unwrap().as_ref(), b"status 503");
}

#[tokio::test]
async fn loader_https_against_plain_server() {
    let addr = spawn_fixture_server().await;
    let err = service()
        .create_url_loader()
        .start(UrlRequest::get(format!("https://127.0.0.1:{}/hello", addr.port())))
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::SslHandshakeIncomplete(_)));
}

#[tokio::test]
async fn loader_unresolvable_host() {
    let err = service()
        .create_url_loader()
        .start(UrlRequest::get("http://host.that.does.not.exist.invalid/"))
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::NameNotResolved(_)));
}

#[tokio::test]
async fn streamed_load_holds_a_slot_until_the_body_ends() {
    init_logging();
    let addr = spawn_fixture_server().await;
    let config = TransportConfig {
        max_concurrent_loads: 1,
        stream_chunk_size: 1024,
        stream_channel_capacity: 1,
        ..TransportConfig::default()
    };
    let service = NetworkService::new(config).unwrap();
    let response = service
        .create_url_loader()
        .start(UrlRequest::get(format!("http://{addr}/bytes/200000")))
        .await
        .unwrap();
    assert_eq!(service.available_slots(), 0);

    let body = response.body.into_stream().unwrap().read_to_end().await.unwrap();
    assert_eq!(body.len(), 200000);

    let released = tokio::time::timeout(Duration::from_secs(5), async {
        while service.available_slots() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(released.is_ok(), "slot was not released after the body ended");
}
