//! One-shot raw TCP responder.
//!
//! Accepts a single connection, captures the request (head plus a
//! `Content-Length` body if announced), writes the configured bytes verbatim
//! and closes. The captured request is returned through the join handle.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Response bytes, optionally split into parts written with a pause between
/// them.
#[derive(Debug, Clone, Default)]
pub struct Canned {
    parts: Vec<Vec<u8>>,
    pause: Duration,
}

impl Canned {
    pub fn new(response: impl Into<Vec<u8>>) -> Self {
        Self {
            parts: vec![response.into()],
            pause: Duration::ZERO,
        }
    }

    /// Close the connection without writing anything.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn then(mut self, part: impl Into<Vec<u8>>) -> Self {
        self.parts.push(part.into());
        self
    }

    pub fn pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Serve on an ephemeral localhost port.
    pub async fn serve_once(self) -> std::io::Result<(SocketAddr, JoinHandle<std::io::Result<Vec<u8>>>)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let (mut socket, peer) = listener.accept().await?;
            log::debug!("canned: connection from {peer}");
            let request = read_request(&mut socket).await?;
            // The client may hang up early, e.g. after a redirect head.
            if let Err(e) = respond(&mut socket, &self.parts, self.pause).await {
                log::debug!("canned: peer went away: {e}");
            }
            Ok::<_, std::io::Error>(request)
        });
        Ok((addr, handle))
    }
}

async fn respond(socket: &mut TcpStream, parts: &[Vec<u8>], pause: Duration) -> std::io::Result<()> {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        socket.write_all(part).await?;
    }
    socket.shutdown().await
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(request);
        }
        request.extend_from_slice(&buf[..n]);
    };

    let expected = head_end + content_length(&request[..head_end]);
    while request.len() < expected {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
    }
    Ok(request)
}

fn content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}
