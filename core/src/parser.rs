//! Status line and header block parsing.
//!
//! These functions work on bytes already sitting in the connection's read
//! buffer; they never read from the socket themselves.

use crate::error::NetError;

const CRLF: &[u8] = b"\r\n";
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// A parsed `<version> <code> <message>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: String,
    pub code: u32,
    pub message: String,
}

/// Index of the first `\r\n` in `buf`.
pub fn find_line_end(buf: &[u8]) -> Option<usize> {
    find(buf, CRLF)
}

/// Length of the header block at the start of `buf`, terminator included.
///
/// `buf` starts right after the status line, so an immediate `\r\n` is an
/// empty header block.
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    if buf.starts_with(CRLF) {
        return Some(CRLF.len());
    }
    find(buf, HEAD_TERMINATOR).map(|i| i + HEAD_TERMINATOR.len())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parse a status line (without its trailing `\r\n`).
///
/// Only the `HTTP/` prefix and the numeric code are validated. Any unsigned
/// integer is accepted as a code; 4xx and 5xx are ordinary outcomes at this
/// layer.
pub fn parse_status_line(line: &[u8]) -> Result<StatusLine, NetError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim_start();

    let (version, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    let rest = rest.trim_start();
    let (code, message) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));

    if !version.starts_with("HTTP/") {
        return Err(NetError::InvalidResponse(format!("bad protocol version {version:?}")));
    }
    let code: u32 = code
        .parse()
        .map_err(|_| NetError::InvalidResponse(format!("bad status code {code:?}")))?;

    Ok(StatusLine {
        version: version.to_string(),
        code,
        message: message.trim_start_matches(' ').trim_end_matches('\r').to_string(),
    })
}

/// Split one header line on its first `:`.
///
/// The value loses leading spaces and everything from the first `\r` on. A
/// line without `:` becomes a header with the whole line as its name and an
/// empty value; empty names and values are not errors.
pub fn parse_header_field(line: &str) -> (String, String) {
    match line.split_once(':') {
        Some((name, rest)) => {
            let value = rest.trim_start_matches(' ');
            let value = value.split('\r').next().unwrap_or_default();
            (name.to_string(), value.to_string())
        }
        None => (line.to_string(), String::new()),
    }
}

/// Parse every header line of `block`, stopping at the first blank line.
///
/// Lines end at `\n`; a trailing `\r` is dropped by `parse_header_field`, so a
/// bare-LF line is a header of its own.
pub fn parse_header_block(block: &[u8]) -> Vec<(String, String)> {
    String::from_utf8_lossy(block)
        .split('\n')
        .take_while(|line| !line.is_empty() && *line != "\r")
        .map(parse_header_field)
        .collect()
}

/// Value of the last header named `name` (ASCII case-insensitive).
pub fn last_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .rev()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
