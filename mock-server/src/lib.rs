//! HTTP fixtures for exercising the transport core end to end.
//!
//! `app()` is an axum router with a handful of well-known endpoints.
//! `canned` serves exact bytes over raw TCP for responses no well-behaved
//! HTTP server would produce.

use axum::{
    body::Bytes,
    extract::Path,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

pub mod canned;

/// What `/echo` saw.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

pub fn app() -> Router {
    Router::new()
        .route("/hello", get(hello))
        .route("/echo", any(echo))
        .route("/redirect/{hops}", get(redirect))
        .route("/moved", get(moved))
        .route("/bytes/{len}", get(bytes))
        .route("/status/{code}", get(status))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Deterministic body used by `/bytes/{len}`.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn hello() -> &'static str {
    "hello"
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    let headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    Json(Echo {
        method: method.to_string(),
        uri: uri.to_string(),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

/// Redirects to itself with one hop less until `hops` reaches zero.
async fn redirect(Path(hops): Path<u32>) -> Response {
    if hops == 0 {
        return "redirected".into_response();
    }
    log::debug!("redirect, {hops} hops left");
    (
        StatusCode::FOUND,
        [(header::LOCATION, format!("/redirect/{}", hops - 1))],
    )
        .into_response()
}

async fn moved() -> Response {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, "/hello")]).into_response()
}

async fn bytes(Path(len): Path<usize>) -> Vec<u8> {
    pattern(len)
}

async fn status(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(status) => (status, format!("status {code}")).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}
